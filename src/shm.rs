use crate::pair::Transport;
use crate::Result;
use log::error;
use std::marker::PhantomData;
use std::ops::Deref;
use std::{mem, ptr};

/// Anonymous `MAP_SHARED` mapping.
///
/// Created before a fork, the mapping is visible to both processes. Each
/// process unmaps its own view on drop.
#[derive(Debug)]
pub struct Shm {
    addr: *mut u8,
    size: usize,
}

unsafe impl Send for Shm {}
unsafe impl Sync for Shm {}

impl Shm {
    pub fn anonymous(size: usize) -> Result<Shm> {
        unsafe {
            let addr = libc::mmap(
                ptr::null_mut::<libc::c_void>(),
                size as _,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANON,
                -1,
                0,
            );
            if addr == libc::MAP_FAILED {
                return_errno!("mmap");
            }
            Ok(Shm {
                addr: addr as _,
                size,
            })
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.addr
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Drop for Shm {
    fn drop(&mut self) {
        unsafe {
            if libc::munmap(self.addr as _, self.size as _) == -1 {
                error!("munmap: {}", std::io::Error::last_os_error());
            }
        }
    }
}

/// A `T` placed at the start of a [`Shm`].
///
/// The value is built in place and never moved. Its destructor is never run:
/// both processes hold a view of the same value, so neither may tear it down
/// while the other could still be using it. Only the mapping itself is
/// released.
#[derive(Debug)]
pub struct Shared<T> {
    shm: Shm,
    _marker: PhantomData<T>,
}

unsafe impl<T: Sync> Send for Shared<T> {}
unsafe impl<T: Sync> Sync for Shared<T> {}

impl<T> Shared<T> {
    /// Maps a region large enough for `T` and lets `init` construct it.
    ///
    /// `init` receives a pointer to zero-filled, page aligned storage and
    /// must fully initialise the `T` before returning `Ok`.
    pub fn new<F>(init: F) -> Result<Shared<T>>
    where
        F: FnOnce(*mut T) -> Result<()>,
    {
        let shm = Shm::anonymous(mem::size_of::<T>().max(1))?;
        debug_assert_eq!(shm.as_ptr() as usize % mem::align_of::<T>(), 0);
        init(shm.as_mut_ptr() as *mut T)?;
        Ok(Shared {
            shm,
            _marker: PhantomData,
        })
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*(self.shm.as_ptr() as *const T) }
    }
}

// Both sides keep the whole mapping; there are no ends to close.
impl<T> Transport for Shared<T> {
    type Parent = Shared<T>;
    type Child = Shared<T>;

    fn into_parent(self) -> Shared<T> {
        self
    }

    fn into_child(self) -> Shared<T> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    #[test]
    fn anonymous_mapping_is_zeroed() {
        let shm = Shm::anonymous(4096).unwrap();
        assert_eq!(shm.len(), 4096);
        let bytes = unsafe { std::slice::from_raw_parts(shm.as_ptr(), shm.len()) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn shared_value_is_visible_across_threads() {
        let shared = Shared::<AtomicU64>::new(|slot| {
            unsafe { slot.write(AtomicU64::new(7)) };
            Ok(())
        })
        .unwrap();

        thread::scope(|s| {
            s.spawn(|| shared.fetch_add(1, Ordering::SeqCst));
        });
        assert_eq!(shared.load(Ordering::SeqCst), 8);
    }
}
