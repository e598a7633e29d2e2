//! Double-buffered hand-off of draw lists between the frontend thread and
//! the backend thread.
//!
//! Two lists circulate. The frontend acquires a consumed list, fills it and
//! submits it ("list ready"); the backend receives it, draws it and releases
//! it ("list consumed"). Ownership moves with the boxed list, so neither side
//! can touch a list the other is using.

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::draw_list::DrawList;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("the other side of the frame exchange hung up")]
    Disconnected,
}

/// Frontend end of the exchange.
#[derive(Debug)]
pub struct FrontendSlots {
    free: Receiver<Box<DrawList>>,
    ready: Sender<Box<DrawList>>,
}

/// Backend end of the exchange.
#[derive(Debug)]
pub struct BackendSlots {
    ready: Receiver<Box<DrawList>>,
    free: Sender<Box<DrawList>>,
}

/// Connect a frontend and a backend over the two lists `a` and `b`.
pub fn frame_exchange(a: DrawList, b: DrawList) -> (FrontendSlots, BackendSlots) {
    let (free_tx, free_rx) = bounded(2);
    let (ready_tx, ready_rx) = bounded(2);
    // Cannot fail: the channel has room for both and the receiver is alive.
    let _ = free_tx.send(Box::new(a));
    let _ = free_tx.send(Box::new(b));
    (
        FrontendSlots {
            free: free_rx,
            ready: ready_tx,
        },
        BackendSlots {
            ready: ready_rx,
            free: free_tx,
        },
    )
}

impl FrontendSlots {
    /// Block until the backend has released a list.
    pub fn acquire(&self) -> Result<Box<DrawList>, ExchangeError> {
        self.free.recv().map_err(|_| ExchangeError::Disconnected)
    }

    pub fn try_acquire(&self) -> Option<Box<DrawList>> {
        self.free.try_recv().ok()
    }

    /// Hand a filled list to the backend.
    pub fn submit(&self, list: Box<DrawList>) -> Result<(), ExchangeError> {
        self.ready.send(list).map_err(|_| ExchangeError::Disconnected)
    }
}

impl BackendSlots {
    /// Block until the frontend submits a list. Fails once the frontend is
    /// dropped and every submitted list has been received.
    pub fn receive(&self) -> Result<Box<DrawList>, ExchangeError> {
        self.ready.recv().map_err(|_| ExchangeError::Disconnected)
    }

    /// Return a drawn list to the frontend.
    pub fn release(&self, list: Box<DrawList>) -> Result<(), ExchangeError> {
        self.free.send(list).map_err(|_| ExchangeError::Disconnected)
    }

    /// Draw every list the frontend submits until it hangs up, including the
    /// ones still queued when it does. Returns the number drawn.
    pub fn drain(&self, mut draw: impl FnMut(&DrawList)) -> usize {
        let mut drawn = 0;
        while let Ok(list) = self.receive() {
            draw(&list);
            drawn += 1;
            if self.release(list).is_err() {
                tracing::trace!(drawn, "frontend gone, draining queued lists");
            }
        }
        drawn
    }
}
