//! Link-state tracking for the sync engine.
//!
//! The embedding shell reports platform online/offline edge events through
//! [`ConnectivityMonitor::set_online`] and [`ConnectivityMonitor::set_offline`];
//! nothing here polls. The reconnect hook fires exactly once per
//! offline-to-online transition, and registration is guarded so a
//! re-instantiated caller cannot stack duplicate hooks.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

type ReconnectHook = Box<dyn Fn() + Send + Sync>;

pub struct ConnectivityMonitor {
	state: watch::Sender<bool>,
	hook: Mutex<Option<ReconnectHook>>,
}

impl ConnectivityMonitor {
	pub fn new(initially_online: bool) -> Arc<Self> {
		let (state, _) = watch::channel(initially_online);
		Arc::new(Self {
			state,
			hook: Mutex::new(None),
		})
	}

	pub fn is_online(&self) -> bool {
		*self.state.borrow()
	}

	/// Reports an online edge event. Only an actual offline-to-online
	/// transition fires the reconnect hook; repeated online events while
	/// already online do not.
	pub fn set_online(&self) {
		let was_online = self.state.send_replace(true);
		if was_online {
			return;
		}

		info!("network link restored");
		if let Some(hook) = &*self.hook.lock() {
			hook();
		}
	}

	pub fn set_offline(&self) {
		let was_online = self.state.send_replace(false);
		if was_online {
			warn!("network link lost");
		}
	}

	/// Watch the raw link state, for UIs that render an offline banner.
	pub fn subscribe(&self) -> watch::Receiver<bool> {
		self.state.subscribe()
	}

	/// Registers the reconnect hook. Only the first registration wins;
	/// later calls are rejected so repeated initialization cannot trigger
	/// multiple queue drains per transition.
	///
	/// The hook runs on the thread reporting the edge event, so it should
	/// hand real work off to a task.
	pub fn on_online<F>(&self, callback: F) -> bool
	where
		F: Fn() + Send + Sync + 'static,
	{
		let mut hook = self.hook.lock();
		if hook.is_some() {
			warn!("reconnect hook already registered, ignoring duplicate registration");
			return false;
		}

		*hook = Some(Box::new(callback));
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn counting_hook(monitor: &ConnectivityMonitor) -> Arc<AtomicUsize> {
		let fired = Arc::new(AtomicUsize::new(0));
		let count = fired.clone();
		assert!(monitor.on_online(move || {
			count.fetch_add(1, Ordering::SeqCst);
		}));
		fired
	}

	#[test]
	fn hook_fires_once_per_offline_online_transition() {
		let monitor = ConnectivityMonitor::new(false);
		let fired = counting_hook(&monitor);

		monitor.set_online();
		assert_eq!(fired.load(Ordering::SeqCst), 1);

		// A repeated online event while already online is not a transition.
		monitor.set_online();
		assert_eq!(fired.load(Ordering::SeqCst), 1);

		monitor.set_offline();
		monitor.set_online();
		assert_eq!(fired.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn offline_events_never_fire_the_hook() {
		let monitor = ConnectivityMonitor::new(true);
		let fired = counting_hook(&monitor);

		monitor.set_offline();
		monitor.set_offline();
		assert_eq!(fired.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn duplicate_registration_is_rejected() {
		let monitor = ConnectivityMonitor::new(true);

		assert!(monitor.on_online(|| {}));
		assert!(!monitor.on_online(|| {}));
	}

	#[test]
	fn reflects_current_link_state() {
		let monitor = ConnectivityMonitor::new(true);
		assert!(monitor.is_online());

		monitor.set_offline();
		assert!(!monitor.is_online());

		monitor.set_online();
		assert!(monitor.is_online());
	}

	#[test]
	fn subscribers_observe_state_changes() {
		let monitor = ConnectivityMonitor::new(true);
		let rx = monitor.subscribe();

		monitor.set_offline();
		assert!(!*rx.borrow());
	}
}
