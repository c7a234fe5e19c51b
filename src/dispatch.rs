use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub fn hardware_concurrency() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Fixed pool of worker threads consuming queued tasks. Workers drain the
/// queue before exiting, so dropping the dispatcher waits for outstanding
/// work instead of abandoning it.
pub struct Dispatcher {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<State>,
    work: Condvar,
    drained: Condvar,
}

struct State {
    queue: VecDeque<Task>,
    active: usize,
    quitting: bool,
}

impl Dispatcher {
    pub fn new(threads: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                active: 0,
                quitting: false,
            }),
            work: Condvar::new(),
            drained: Condvar::new(),
        });

        let workers = (0..threads.max(1))
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(&shared))
            })
            .collect();

        Self { shared, workers }
    }

    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        let mut state = self.shared.state.lock().unwrap();
        state.queue.push_back(Box::new(task));
        drop(state);
        self.shared.work.notify_one();
    }

    /// Block until the queue is empty and every running task has finished.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while !state.queue.is_empty() || state.active > 0 {
            state = self.shared.drained.wait(state).unwrap();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.quitting = true;
        }
        self.shared.work.notify_all();

        for worker in self.workers.drain(..) {
            worker.join().ok();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(task) = state.queue.pop_front() {
                    state.active += 1;
                    break task;
                }
                if state.quitting {
                    return;
                }
                state = shared.work.wait(state).unwrap();
            }
        };

        task();

        let mut state = shared.state.lock().unwrap();
        state.active -= 1;
        if state.queue.is_empty() && state.active == 0 {
            shared.drained.notify_all();
        }
    }
}
