//! Per socket condition register
//!
//! Bits are raised by the URC dispatcher and consumed by the single task owning the socket.
//! The `dirty` flag tracks whether anything was raised since the last successful [ConditionState::wait],
//! so that [ConditionState::clear] never drops a bit which got raised again in between.
use bitflags::bitflags;
use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;

bitflags! {
    /// Socket conditions signaled by URC messages
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Condition: u8 {
        /// Open was confirmed by the modem
        const CONNECTED = 0b001;
        /// Modem buffers data which may be read
        const READ_READY = 0b010;
        /// Socket was closed, either locally or by the modem
        const CLOSED = 0b100;
    }
}

struct Register {
    bits: Condition,

    /// True if bits were set since the last observing wait
    dirty: bool,

    waker: WakerRegistration,
}

/// Monitor protected condition bitset supporting exactly one waiter
pub(crate) struct ConditionState {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Register>>,
}

impl ConditionState {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Register {
                bits: Condition::empty(),
                dirty: false,
                waker: WakerRegistration::new(),
            })),
        }
    }

    /// Waits until any bit of `mask` or [Condition::CLOSED] is set
    pub async fn wait(&self, mask: Condition) -> Condition {
        self.wait_with(mask, Condition::CLOSED).await
    }

    /// Waits until any bit of `mask | error_mask` is set and returns the matching bits
    pub async fn wait_with(&self, mask: Condition, error_mask: Condition) -> Condition {
        let wanted = mask | error_mask;

        poll_fn(|cx| {
            self.inner.lock(|register| {
                let mut register = register.borrow_mut();
                let matching = register.bits & wanted;

                if matching.is_empty() {
                    register.waker.register(cx.waker());
                    return Poll::Pending;
                }

                register.dirty = false;
                Poll::Ready(matching)
            })
        })
        .await
    }

    /// Raises the given bits and wakes the waiter
    pub fn set(&self, bits: Condition) {
        self.inner.lock(|register| {
            let mut register = register.borrow_mut();
            register.bits |= bits;
            register.dirty = true;
            register.waker.wake();
        });
    }

    /// Removes the given bits, unless anything was raised since the last wait
    pub fn clear(&self, bits: Condition) {
        self.inner.lock(|register| {
            let mut register = register.borrow_mut();
            if !register.dirty {
                register.bits.remove(bits);
            }
        });
    }

    /// Current bits
    pub fn bits(&self) -> Condition {
        self.inner.lock(|register| register.borrow().bits)
    }

    /// Empties the register for a newly allocated socket
    pub fn reset(&self) {
        self.inner.lock(|register| {
            let mut register = register.borrow_mut();
            register.bits = Condition::empty();
            register.dirty = false;
        });
    }
}
