//! MessageQueue: FIFO queue with async notification.
//!
//! Single-threaded building block shared by channel endpoints and the
//! endpoint adapter's inbound pump. Producers `push`, consumers `recv().await`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// FIFO message queue with waker-based notification.
///
/// Uses `RefCell` for the single-threaded runtime. Closing wakes every
/// waiter; `recv` keeps draining queued messages after close and only then
/// returns `None`.
pub struct MessageQueue<T> {
    inner: RefCell<MessageQueueInner<T>>,
}

struct MessageQueueInner<T> {
    queue: VecDeque<T>,
    wakers: Vec<Waker>,
    closed: bool,
    messages_received: u64,
    messages_dropped: u64,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(MessageQueueInner {
                queue: VecDeque::new(),
                wakers: Vec::new(),
                closed: false,
                messages_received: 0,
                messages_dropped: 0,
            }),
        }
    }

    /// Enqueue a message and wake waiters.
    ///
    /// Returns `false` and drops the message if the queue is closed.
    pub fn push(&self, message: T) -> bool {
        let wakers = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                inner.messages_dropped += 1;
                return false;
            }
            inner.queue.push_back(message);
            inner.messages_received += 1;
            std::mem::take(&mut inner.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&self) -> Option<T> {
        self.inner.borrow_mut().queue.pop_front()
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub fn recv(&self) -> RecvFuture<'_, T> {
        RecvFuture { queue: self }
    }

    /// Mark the queue closed and wake every waiter.
    pub fn close(&self) {
        let wakers = {
            let mut inner = self.inner.borrow_mut();
            inner.closed = true;
            std::mem::take(&mut inner.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Whether no message is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Total number of messages accepted.
    pub fn messages_received(&self) -> u64 {
        self.inner.borrow().messages_received
    }

    /// Number of messages rejected because the queue was closed.
    pub fn messages_dropped(&self) -> u64 {
        self.inner.borrow().messages_dropped
    }
}

/// Future returned by [`MessageQueue::recv`].
pub struct RecvFuture<'a, T> {
    queue: &'a MessageQueue<T>,
}

impl<T> Future for RecvFuture<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.queue.inner.borrow_mut();

        if let Some(message) = inner.queue.pop_front() {
            return Poll::Ready(Some(message));
        }

        if inner.closed {
            return Poll::Ready(None);
        }

        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
