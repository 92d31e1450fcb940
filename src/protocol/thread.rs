//! Fixed-size worker pool for client connections.

use std::{
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

impl ThreadPool {
    pub fn new(size: usize) -> Self {
        assert!(size > 0);

        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|id| Worker::new(id, Arc::clone(&receiver)))
            .collect();

        Self {
            workers,
            sender: Some(sender),
        }
    }

    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .as_ref()
            .expect("pool is alive while the sender exists")
            .send(Box::new(job))
            .expect("workers outlive the pool");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker's recv loop.
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("waiting for worker {} to drain", worker.id);
            let _ = worker.handle.join();
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    handle: thread::JoinHandle<()>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Self {
        let handle = thread::spawn(move || {
            loop {
                let job = receiver.lock().unwrap().recv();
                match job {
                    Ok(job) => {
                        debug!("worker {id} picked up a connection");
                        job();
                    }
                    Err(_) => {
                        debug!("worker {id} shutting down");
                        break;
                    }
                }
            }
        });

        Self { id, handle }
    }
}
