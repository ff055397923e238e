//! Ordering and completion tracking of the job queue.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use dirsync::jobs::EntryExecutor;
use dirsync::{Job, JobEntry, JobError, JobQueue, JobState, Operation, QueueEvent};

const TIMEOUT: Duration = Duration::from_secs(10);

fn entry(target: &str) -> JobEntry {
    JobEntry::new(Operation::Modify, false, "/src/a.txt", target, "/src")
}

/// Executor that blocks entries targeting `/slow*` until the gate opens.
fn gated_queue(threads: usize) -> (JobQueue, Sender<()>) {
    let (open, gate): (Sender<()>, Receiver<()>) = bounded(0);
    let executor: Arc<dyn EntryExecutor> = Arc::new(move |e: &JobEntry| -> Result<(), JobError> {
        if e.target().starts_with("/slow") {
            let _ = gate.recv_timeout(TIMEOUT);
        }
        Ok(())
    });
    (JobQueue::start(executor, threads).unwrap(), open)
}

fn next_event(events: &Receiver<QueueEvent>) -> QueueEvent {
    events.recv_timeout(TIMEOUT).expect("queue event")
}

#[test]
fn test_fifo_order_even_if_later_job_is_faster() {
    let (queue, open) = gated_queue(2);
    let events = queue.subscribe();

    let a = queue.submit(Job::single(entry("/slow/a.txt"))).unwrap();
    let b = queue.submit(Job::single(entry("/fast/a.txt"))).unwrap();

    assert_eq!(next_event(&events), QueueEvent::Submitted(a));
    assert_eq!(next_event(&events), QueueEvent::Submitted(b));
    assert_eq!(next_event(&events), QueueEvent::Started(a));

    // B is queued behind the blocked A
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(queue.job_state(b), Some(JobState::Queued));
    assert_eq!(queue.pending_jobs(), 2);

    open.send(()).unwrap();

    let mut order = Vec::new();
    while order.last() != Some(&QueueEvent::Completed(b)) {
        match next_event(&events) {
            QueueEvent::EntryFinished { .. } => {}
            other => order.push(other),
        }
    }
    assert_eq!(
        order,
        vec![
            QueueEvent::Completed(a),
            QueueEvent::Started(b),
            QueueEvent::Completed(b)
        ]
    );
    assert!(queue.wait_idle(TIMEOUT));
}

#[test]
fn test_fan_out_done_only_after_last_entry() {
    let (queue, open) = gated_queue(3);
    let events = queue.subscribe();

    let id = queue
        .submit(Job::new(vec![
            entry("/t1/a.txt"),
            entry("/t2/a.txt"),
            entry("/slow/a.txt"),
        ]))
        .unwrap();

    let mut finished = 0;
    while finished < 2 {
        if let QueueEvent::EntryFinished { job, .. } = next_event(&events) {
            assert_eq!(job, id);
            finished += 1;
        }
    }

    // Two of three entries done: still processing
    assert_eq!(queue.job_state(id), Some(JobState::Processing));
    assert!(queue.has_pending_work());

    open.send(()).unwrap();
    assert!(queue.wait_idle(TIMEOUT));
    assert_eq!(queue.job_state(id), Some(JobState::Done));
}

#[test]
fn test_failing_and_panicking_entries_still_finish() {
    let executor: Arc<dyn EntryExecutor> = Arc::new(|e: &JobEntry| -> Result<(), JobError> {
        if e.target().starts_with("/panic") {
            panic!("executor blew up");
        }
        Err(JobError::SourceMissing(e.source().to_path_buf()))
    });
    let queue = JobQueue::start(executor, 2).unwrap();

    let first = queue
        .submit(Job::new(vec![entry("/panic/a.txt"), entry("/err/a.txt")]))
        .unwrap();
    let second = queue.submit(Job::single(entry("/err/b.txt"))).unwrap();

    assert!(queue.wait_idle(TIMEOUT));
    assert_eq!(queue.job_state(first), Some(JobState::Done));
    assert_eq!(queue.job_state(second), Some(JobState::Done));
}

#[test]
fn test_empty_job_is_ignored() {
    let (queue, _open) = gated_queue(1);
    assert_eq!(queue.submit(Job::new(Vec::new())), None);
    assert!(!queue.has_pending_work());
}

#[test]
fn test_close_leaves_queued_jobs_unstarted() {
    let (queue, open) = gated_queue(1);
    let events = queue.subscribe();

    let a = queue.submit(Job::single(entry("/slow/a.txt"))).unwrap();
    queue.submit(Job::single(entry("/fast/b.txt"))).unwrap();
    queue.submit(Job::single(entry("/fast/c.txt"))).unwrap();

    while next_event(&events) != QueueEvent::Started(a) {}

    // Release A from another thread while close() waits for the worker
    let (done_tx, done_rx) = unbounded();
    let closer = {
        let queue = queue.clone();
        std::thread::spawn(move || done_tx.send(queue.close()).unwrap())
    };
    std::thread::sleep(Duration::from_millis(100));
    open.send(()).unwrap();

    assert_eq!(done_rx.recv_timeout(TIMEOUT).unwrap(), 2);
    closer.join().unwrap();
}

#[test]
fn test_list_jobs_shows_processing_first() {
    let (queue, open) = gated_queue(1);
    let events = queue.subscribe();

    let a = queue.submit(Job::single(entry("/slow/a.txt"))).unwrap();
    queue.submit(Job::single(entry("/fast/b.txt"))).unwrap();
    while next_event(&events) != QueueEvent::Started(a) {}

    let jobs = queue.list_jobs();
    assert_eq!(jobs.len(), 2);
    assert!(jobs[0].contains("/slow/a.txt"));
    assert!(jobs[1].contains("/fast/b.txt"));

    open.send(()).unwrap();
    assert!(queue.wait_idle(TIMEOUT));
    assert!(queue.list_jobs().is_empty());
}
