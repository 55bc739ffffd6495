use crate::Result;
use log::error;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::{fmt, mem, ptr};

/// A `PTHREAD_PROCESS_SHARED` mutex owning the data it guards.
///
/// Lives inside a [`Shared`](crate::shm::Shared) mapping, so it is built in
/// place with [`ProcessMutex::init`] and never moved afterwards. It works the
/// same between threads of one process, which is how the tests drive it.
#[repr(C)]
pub struct ProcessMutex<T> {
    raw: UnsafeCell<libc::pthread_mutex_t>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for ProcessMutex<T> {}
unsafe impl<T: Send> Sync for ProcessMutex<T> {}

impl<T> ProcessMutex<T> {
    /// Initialises a mutex holding `value` at `slot`.
    ///
    /// # Safety
    ///
    /// `slot` must be valid for writes, suitably aligned, and must not be
    /// moved once initialised.
    pub unsafe fn init(slot: *mut Self, value: T) -> Result<()> {
        let mut attr: libc::pthread_mutexattr_t = mem::zeroed();
        check_code!(
            libc::pthread_mutexattr_init(&mut attr),
            "pthread_mutexattr_init"
        );
        let ret = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        if ret != 0 {
            libc::pthread_mutexattr_destroy(&mut attr);
            check_code!(ret, "pthread_mutexattr_setpshared");
        }
        let raw = UnsafeCell::raw_get(ptr::addr_of_mut!((*slot).raw));
        let ret = libc::pthread_mutex_init(raw, &attr);
        libc::pthread_mutexattr_destroy(&mut attr);
        check_code!(ret, "pthread_mutex_init");

        UnsafeCell::raw_get(ptr::addr_of_mut!((*slot).data)).write(value);
        Ok(())
    }

    pub fn lock(&self) -> Result<ProcessMutexGuard<'_, T>> {
        unsafe {
            check_code!(libc::pthread_mutex_lock(self.raw.get()), "pthread_mutex_lock");
        }
        Ok(ProcessMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }
}

impl<T> fmt::Debug for ProcessMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessMutex").finish_non_exhaustive()
    }
}

/// Unlocks on drop. Must be released by the thread that locked it.
pub struct ProcessMutexGuard<'a, T> {
    mutex: &'a ProcessMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for ProcessMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for ProcessMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for ProcessMutexGuard<'_, T> {
    fn drop(&mut self) {
        unsafe {
            let ret = libc::pthread_mutex_unlock(self.mutex.raw.get());
            if ret != 0 {
                error!("pthread_mutex_unlock: errno {}", ret);
            }
        }
    }
}
