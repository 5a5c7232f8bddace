use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per booking id. Every operation that reads a booking,
/// talks to the gateway and writes it back holds the guard throughout, so
/// the no-show timer, access confirmation and releases on the same booking
/// are linearized while different bookings proceed in parallel.
#[derive(Default)]
pub struct BookingLocks {
    inner: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl BookingLocks {
    pub async fn acquire(&self, booking_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.retain(|_, weak| weak.strong_count() > 0);
            match map.get(booking_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    map.insert(booking_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let map = self.inner.lock().unwrap();
        map.values().filter(|w| w.strong_count() > 0).count()
    }
}
