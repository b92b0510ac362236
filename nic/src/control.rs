//! Control queues between software and the data plane.
//!
//! Software posts send requests (a buffer to transmit) and receive requests
//! (a buffer to fill), and collects one completion per request. Every queue
//! has a fixed depth set at construction.
//!
//! # Usage
//!
//! ```ignore
//! let handle = lb.nic().handle();
//! handle.post_send(SendRequest::new(0x1000, 60, false))?;
//! handle.post_recv(0x2000)?;
//! lb.run_until_idle(1000);
//! assert_eq!(handle.recv_completion(), Some(60));
//! ```

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use spin::Mutex;

use crate::error::{NicError, Result};

/// Transmit `len` bytes starting at `addr`.
///
/// A `partial` request continues into the next one: its final word is not
/// marked as the end of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRequest {
    pub addr: u64,
    pub len: usize,
    pub partial: bool,
}

impl SendRequest {
    pub const fn new(addr: u64, len: usize, partial: bool) -> Self {
        Self { addr, len, partial }
    }
}

/// FIFO with a fixed depth.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    depth: usize,
}

impl<T> BoundedQueue<T> {
    /// # Panics
    ///
    /// Panics if depth is 0.
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0, "Queue depth must be > 0");
        Self { items: VecDeque::with_capacity(depth), depth }
    }

    /// Append `item`, or fail with `QueueFull`.
    pub fn enqueue(&mut self, item: T) -> Result<()> {
        if self.is_full() {
            return Err(NicError::QueueFull);
        }
        self.items.push_back(item);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.depth
    }
}

/// The four control queues.
#[derive(Debug)]
pub struct ControlQueues {
    pub send_req: BoundedQueue<SendRequest>,
    pub recv_req: BoundedQueue<u64>,
    pub send_comp: BoundedQueue<bool>,
    pub recv_comp: BoundedQueue<usize>,
}

impl ControlQueues {
    pub fn new(depth: usize) -> Self {
        Self {
            send_req: BoundedQueue::new(depth),
            recv_req: BoundedQueue::new(depth),
            send_comp: BoundedQueue::new(depth),
            recv_comp: BoundedQueue::new(depth),
        }
    }
}

/// Software side of the control queues. Cheap to clone and shareable.
#[derive(Debug, Clone)]
pub struct NicHandle {
    queues: Arc<Mutex<ControlQueues>>,
}

impl NicHandle {
    pub(crate) fn new(queues: Arc<Mutex<ControlQueues>>) -> Self {
        Self { queues }
    }

    /// Post a buffer for transmission.
    pub fn post_send(&self, req: SendRequest) -> Result<()> {
        self.queues.lock().send_req.enqueue(req)
    }

    /// Post a buffer to receive the next packet into.
    pub fn post_recv(&self, addr: u64) -> Result<()> {
        self.queues.lock().recv_req.enqueue(addr)
    }

    /// Collect one send completion.
    pub fn send_completion(&self) -> Option<bool> {
        self.queues.lock().send_comp.dequeue()
    }

    /// Collect one receive completion: the byte length of the packet.
    pub fn recv_completion(&self) -> Option<usize> {
        self.queues.lock().recv_comp.dequeue()
    }

    /// Send requests not yet picked up.
    pub fn pending_sends(&self) -> usize {
        self.queues.lock().send_req.len()
    }

    /// Receive buffers not yet used.
    pub fn pending_recvs(&self) -> usize {
        self.queues.lock().recv_req.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full() {
        let mut q = BoundedQueue::new(2);
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert_eq!(q.enqueue(3), Err(NicError::QueueFull));
        assert_eq!(q.dequeue(), Some(1));
        q.enqueue(3).unwrap();
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_handle_shares_queues() {
        let queues = Arc::new(Mutex::new(ControlQueues::new(1)));
        let a = NicHandle::new(queues.clone());
        let b = a.clone();
        a.post_recv(0x100).unwrap();
        assert_eq!(b.post_recv(0x200), Err(NicError::QueueFull));
        assert_eq!(b.pending_recvs(), 1);
        assert_eq!(queues.lock().recv_req.dequeue(), Some(0x100));

        queues.lock().recv_comp.enqueue(42).unwrap();
        assert_eq!(b.recv_completion(), Some(42));
        assert_eq!(a.recv_completion(), None);
    }
}
