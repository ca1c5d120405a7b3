use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use photon_types::{PhotonError, Result};

use crate::cancel::Cancel;

use super::CacheKey;

/// How often joined waiters re-check their own cancellation token.
const WAIT_POLL: Duration = Duration::from_millis(25);

struct FlightState {
    done: Option<std::result::Result<Vec<u8>, PhotonError>>,
}

struct Flight {
    state: Mutex<FlightState>,
    cv: Condvar,
    /// Joined (non-leader) waiters still interested in the result.
    joiners: AtomicUsize,
}

impl Flight {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState { done: None }),
            cv: Condvar::new(),
            joiners: AtomicUsize::new(0),
        }
    }

    fn share(done: &std::result::Result<Vec<u8>, PhotonError>) -> Result<Vec<u8>> {
        match done {
            Ok(data) => Ok(data.clone()),
            Err(e) => Err(e.duplicate()),
        }
    }
}

/// Cancellation view handed to the underlying fetch: trips only when the
/// leader has cancelled AND no joined waiter remains. A joiner walking
/// away therefore never aborts the fetch for the callers still waiting.
struct FlightCancel<'a> {
    leader: &'a dyn Cancel,
    joiners: &'a AtomicUsize,
}

impl Cancel for FlightCancel<'_> {
    fn is_cancelled(&self) -> bool {
        self.leader.is_cancelled() && self.joiners.load(Ordering::SeqCst) == 0
    }
}

/// De-duplicates concurrent fetches for the same missing cache key.
pub(crate) struct FlightTable {
    flights: Mutex<HashMap<CacheKey, Arc<Flight>>>,
}

impl FlightTable {
    pub(crate) fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Run `fetch` under single-flight discipline for `key`. The first
    /// caller leads and executes the fetch; concurrent callers join and
    /// wait. `on_success` runs once, on the leader, before waiters wake.
    pub(crate) fn run(
        &self,
        key: CacheKey,
        cancel: &dyn Cancel,
        fetch: impl FnOnce(&dyn Cancel) -> Result<Vec<u8>>,
        on_success: impl FnOnce(&[u8]),
    ) -> Result<Vec<u8>> {
        let (flight, is_leader) = {
            let mut table = self.flights.lock().unwrap();
            match table.get(&key) {
                Some(f) => {
                    f.joiners.fetch_add(1, Ordering::SeqCst);
                    (Arc::clone(f), false)
                }
                None => {
                    let f = Arc::new(Flight::new());
                    table.insert(key, Arc::clone(&f));
                    (f, true)
                }
            }
        };

        if is_leader {
            let flight_cancel = FlightCancel {
                leader: cancel,
                joiners: &flight.joiners,
            };
            let result = fetch(&flight_cancel);
            if let Ok(ref data) = result {
                on_success(data);
            }
            {
                let mut st = flight.state.lock().unwrap();
                st.done = Some(match &result {
                    Ok(data) => Ok(data.clone()),
                    Err(e) => Err(e.duplicate()),
                });
            }
            flight.cv.notify_all();
            self.flights.lock().unwrap().remove(&key);
            result
        } else {
            let mut st = flight.state.lock().unwrap();
            loop {
                if let Some(done) = &st.done {
                    return Flight::share(done);
                }
                if cancel.is_cancelled() {
                    // Leave the flight; remaining waiters keep it alive.
                    flight.joiners.fetch_sub(1, Ordering::SeqCst);
                    return Err(PhotonError::Cancelled);
                }
                let (guard, _) = flight.cv.wait_timeout(st, WAIT_POLL).unwrap();
                st = guard;
            }
        }
    }
}
