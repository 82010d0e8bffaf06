//! # Run queue
//!
//! Runs aimed at the same target are executed one at a time, in submission order.
//! Runs aimed at different targets never wait for each other.
//!
//! ```text
//!                  +-------------------------------+
//! submit(key, t)   | DashMap<key, Lane>            |
//! ---------------> |  "https://a/x" -> [t1 t2 t3] -+--> dispatcher task (a/x)
//!                  |  "https://b/y" -> [t4]       -+--> dispatcher task (b/y)
//!                  +-------------------------------+
//! ```
//!
//! A lane is created the first time its key is seen: a bounded channel plus one
//! dispatcher task that pulls from it for as long as the queue lives. A full lane
//! rejects the submission right away with [`Error::QueueFull`].

use dashmap::DashMap;
use futures::{future::BoxFuture, FutureExt};
use std::{any::Any, future::Future, panic::AssertUnwindSafe};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::*;

use crate::{Error, Result};

/// Default number of runs that may wait behind the running one, per key.
pub const DEFAULT_CAPACITY: usize = 1000;

type Task = BoxFuture<'static, ()>;

struct Lane {
    sender: mpsc::Sender<Task>,
    dispatcher: JoinHandle<()>,
}

impl Lane {
    fn start(key: &str, capacity: usize) -> Lane {
        let (sender, mut receiver) = mpsc::channel::<Task>(capacity);
        let key = key.to_string();
        debug!("starting dispatcher for '{key}' (capacity {capacity})");

        let dispatcher = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                    error!("task queued for '{key}' panicked: {}", panic_message(&*panic));
                }
            }
            debug!("dispatcher for '{key}' stopped");
        });

        Lane { sender, dispatcher }
    }
}

pub struct RunQueue {
    lanes: DashMap<String, Lane>,
    capacity: usize,
}

impl Default for RunQueue {
    fn default() -> RunQueue {
        RunQueue::new(DEFAULT_CAPACITY)
    }
}

impl RunQueue {
    /// `capacity` bounds the runs waiting per key; zero is treated as one.
    pub fn new(capacity: usize) -> RunQueue {
        RunQueue {
            lanes: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue `task` on the lane of `key`, creating the lane on first use.
    ///
    /// Never waits: a full lane is reported as [`Error::QueueFull`]. Must be called
    /// from within a tokio runtime.
    pub fn submit<F>(&self, key: &str, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut task: Task = task.boxed();
        // a lane whose dispatcher is gone (e.g. its runtime shut down) is replaced once
        for _ in 0..2 {
            let sender = self.sender(key);
            match sender.try_send(task) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(_)) => {
                    warn!("queue for '{key}' is full");
                    return Err(Error::QueueFull {
                        key: key.to_string(),
                    });
                }
                Err(TrySendError::Closed(returned)) => {
                    warn!("dispatcher for '{key}' is gone, restarting it");
                    self.lanes
                        .remove_if(key, |_, lane| lane.sender.same_channel(&sender));
                    task = returned;
                }
            }
        }
        Err(Error::QueueFull {
            key: key.to_string(),
        })
    }

    /// Sender of the lane for `key`. The map guard is released before returning.
    fn sender(&self, key: &str) -> mpsc::Sender<Task> {
        self.lanes
            .entry(key.to_string())
            .or_insert_with(|| Lane::start(key, self.capacity))
            .sender
            .clone()
    }

    /// Number of keys that have a lane.
    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Runs waiting on the lane of `key`, not counting the one executing.
    pub fn pending(&self, key: &str) -> usize {
        self.lanes
            .get(key)
            .map(|lane| self.capacity - lane.sender.capacity())
            .unwrap_or_default()
    }

    /// Number of lanes whose dispatcher task is still alive.
    pub fn running(&self) -> usize {
        self.lanes
            .iter()
            .filter(|lane| !lane.dispatcher.is_finished())
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
