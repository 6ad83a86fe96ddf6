//! End-to-end offline flow through the assembled core: submit while
//! offline, reconnect, and verify the queue drains exactly once.

use std::time::Duration;

use sl_core::{
	cloud_api::NewStory,
	testing::MockGateway,
	Core, Submission,
};

async fn wait_until<F, Fut>(mut condition: F)
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = bool>,
{
	let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
	while !condition().await {
		assert!(
			tokio::time::Instant::now() < deadline,
			"condition not met before deadline"
		);
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
}

#[tokio::test]
async fn offline_submission_replays_once_on_reconnect() {
	let dir = tempfile::tempdir().unwrap();
	let gateway = MockGateway::new();
	let core = Core::with_gateway(dir.path(), gateway.clone(), false)
		.await
		.unwrap();
	core.start();

	let submission = core
		.engine
		.submit_story(NewStory {
			description: "Sunset at the bay".to_string(),
			..Default::default()
		})
		.await
		.unwrap();

	let Submission::Queued { story, .. } = submission else {
		panic!("expected the story to be queued while offline");
	};
	assert_eq!(story.synced, Some(false));
	assert_eq!(core.store.unsynced_user_stories().await.unwrap().len(), 1);

	// Link comes back; the reconnect hook drains the queue in the
	// background.
	gateway.queue_create(Ok(()));
	core.connectivity.set_online();

	let store = core.store.clone();
	wait_until(|| {
		let store = store.clone();
		async move { store.unsynced_user_stories().await.unwrap().is_empty() }
	})
	.await;

	let created = gateway.created.lock().clone();
	assert_eq!(created.len(), 1);
	assert_eq!(created[0].0.description, "Sunset at the bay");

	let replayed = core.store.user_story(&story.id).await.unwrap().unwrap();
	assert_eq!(replayed.synced, Some(true));

	// A later manual drain has nothing left to replay.
	let report = core.engine.drain_queue().await.unwrap();
	assert_eq!(report.replayed, 0);
	assert_eq!(gateway.created.lock().len(), 1);
}

#[tokio::test]
async fn repeated_online_events_do_not_stack_drains() {
	let dir = tempfile::tempdir().unwrap();
	let gateway = MockGateway::new();
	let core = Core::with_gateway(dir.path(), gateway.clone(), false)
		.await
		.unwrap();
	core.start();
	// A second start must not register a second reconnect hook.
	core.start();

	core.engine
		.submit_story(NewStory {
			description: "Harbor lights".to_string(),
			..Default::default()
		})
		.await
		.unwrap();

	gateway.queue_create(Ok(()));
	core.connectivity.set_online();

	let store = core.store.clone();
	wait_until(|| {
		let store = store.clone();
		async move { store.unsynced_user_stories().await.unwrap().is_empty() }
	})
	.await;

	// The story went up exactly once even though start() ran twice.
	assert_eq!(gateway.created.lock().len(), 1);
}
