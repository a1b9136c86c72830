//! In-place native instances inside script-managed blocks
//!
//! Ownership is inverted: the runtime allocates the block (through the
//! allocator callback), the bridge constructs the value inside it, and only
//! the runtime's finalizer ends its life. Rust scope exit never drops it.

use super::callable::Receiver;
use core::alloc::Layout;
use core::mem::MaybeUninit;
use core::ptr;

/// Layout of an instance block
///
/// `alive` is set only after construction succeeded and cleared by the
/// single destroy, so a second finalization is a no-op.
#[repr(C)]
pub(crate) struct InstanceSlot<T> {
    alive: bool,
    value: MaybeUninit<T>,
}

/// Monomorphised lifecycle functions for one native type
#[derive(Debug, Clone, Copy)]
pub(crate) struct InstanceVTable {
    pub layout: Layout,
    construct: unsafe fn(*mut u8),
    destroy: unsafe fn(*mut u8) -> bool,
    receiver: unsafe fn(*mut u8) -> Option<*mut (dyn core::any::Any + 'static)>,
}

impl InstanceVTable {
    pub fn of<T: Default + 'static>() -> Self {
        Self {
            layout: Layout::new::<InstanceSlot<T>>(),
            construct: construct::<T>,
            destroy: destroy::<T>,
            receiver: receiver::<T>,
        }
    }

    /// Default-construct a value in `block`
    ///
    /// # Safety
    /// `block` must be writable for `layout.size()` bytes, aligned to
    /// `layout.align()` and hold no live instance.
    #[inline]
    pub unsafe fn construct(&self, block: *mut u8) {
        (self.construct)(block)
    }

    /// Drop the value in `block` if it is still alive
    ///
    /// Returns whether a value was dropped.
    ///
    /// # Safety
    /// `block` must have been passed to [`Self::construct`] of this vtable.
    #[inline]
    pub unsafe fn destroy(&self, block: *mut u8) -> bool {
        (self.destroy)(block)
    }

    /// Borrow the live value as `Any`
    ///
    /// # Safety
    /// As for [`Self::destroy`]; the borrow must not outlive the block or
    /// overlap another borrow of the same instance.
    #[inline]
    pub unsafe fn receiver<'a>(&self, block: *mut u8) -> Option<Receiver<'a>> {
        (self.receiver)(block).map(|value| &mut *value)
    }
}

unsafe fn construct<T: Default>(block: *mut u8) {
    let slot = block.cast::<InstanceSlot<T>>();
    ptr::addr_of_mut!((*slot).alive).write(false);
    // A panicking constructor leaves the slot dead
    ptr::addr_of_mut!((*slot).value).write(MaybeUninit::new(T::default()));
    ptr::addr_of_mut!((*slot).alive).write(true);
}

unsafe fn destroy<T>(block: *mut u8) -> bool {
    let slot = &mut *block.cast::<InstanceSlot<T>>();
    if !slot.alive {
        return false;
    }
    slot.alive = false;
    slot.value.assume_init_drop();
    true
}

unsafe fn receiver<T: 'static>(block: *mut u8) -> Option<*mut (dyn core::any::Any + 'static)> {
    let slot = &mut *block.cast::<InstanceSlot<T>>();
    if !slot.alive {
        return None;
    }
    Some(slot.value.as_mut_ptr() as *mut (dyn core::any::Any + 'static))
}
