//! Watch scheduling: readiness gating, refresh publication, and polling.

use deskimg_engine::mock::{MockReply, MockSpawner};
use deskimg_engine::{EventHub, ImageEvent, ImageProcessor, NerdctlBackend, Resources};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

const K3D: &str = concat!(
    r#"{"CreatedAt":"2021-10-05 22:04:12 +0000 UTC","ID":"171689e43026","Repository":"","Tag":"","Size":"119.2 MiB"}"#,
    "\n",
    r#"{"CreatedAt":"2021-10-05 22:04:20 +0000 UTC","ID":"55fe4b211a51","Repository":"rancher/k3d","Tag":"v0.1.0-beta.7","Size":"46.2 MiB"}"#,
    "\n",
);

fn setup(images: &str) -> (Arc<MockSpawner>, ImageProcessor) {
    let spawner = Arc::new(MockSpawner::new());
    spawner.on("images", MockReply::stdout(images));
    let processor = ImageProcessor::new(
        Arc::new(NerdctlBackend::new()),
        spawner.clone(),
        Resources::new(),
        EventHub::new(),
        "k8s.io",
    );
    (spawner, processor)
}

async fn next_images(rx: &mut broadcast::Receiver<ImageEvent>) -> Option<Vec<deskimg_engine::ImageRecord>> {
    loop {
        match timeout(Duration::from_secs(10), rx.recv()).await {
            Ok(Ok(ImageEvent::ImagesChanged { images })) => return Some(images),
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => return None,
        }
    }
}

async fn no_images_within(rx: &mut broadcast::Receiver<ImageEvent>, wait: Duration) -> bool {
    loop {
        match timeout(wait, rx.recv()).await {
            Ok(Ok(ImageEvent::ImagesChanged { .. })) => return false,
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => return true,
        }
    }
}

#[tokio::test]
async fn inactive_processor_ignores_readiness() {
    let (spawner, processor) = setup(K3D);
    let mut rx = processor.hub().subscribe();

    processor.hub().publish_readiness(true);

    assert!(no_images_within(&mut rx, Duration::from_millis(200)).await);
    assert!(!processor.state().is_k8s_ready);
    assert_eq!(spawner.call_count("images"), 0);
}

#[tokio::test]
async fn active_processor_publishes_once_per_transition() {
    let (_spawner, processor) = setup(K3D);
    let mut rx = processor.hub().subscribe();
    processor.start();

    processor.hub().publish_readiness(true);

    let images = next_images(&mut rx).await.expect("ImagesChanged after readiness");
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].image_name, "rancher/k3d");
    assert_eq!(images[0].tag, "v0.1.0-beta.7");
    assert_eq!(images[0].image_id, "55fe4b211a51");
    assert_eq!(images[0].size, "46.2 MiB");
    assert!(processor.state().is_k8s_ready);

    assert!(no_images_within(&mut rx, Duration::from_millis(200)).await);
}

#[tokio::test]
async fn unready_transition_also_refreshes() {
    let (spawner, processor) = setup(K3D);
    let mut rx = processor.hub().subscribe();
    processor.start();

    processor.hub().publish_readiness(true);
    next_images(&mut rx).await.expect("first refresh");

    processor.hub().publish_readiness(false);
    next_images(&mut rx).await.expect("second refresh");

    assert!(!processor.state().is_k8s_ready);
    assert_eq!(spawner.call_count("images"), 2);
}

#[tokio::test]
async fn stopped_processor_drops_events() {
    let (spawner, processor) = setup(K3D);
    let mut rx = processor.hub().subscribe();
    processor.start();
    processor.stop();

    processor.hub().publish_readiness(true);

    assert!(no_images_within(&mut rx, Duration::from_millis(200)).await);
    assert!(!processor.state().is_k8s_ready);
    assert_eq!(spawner.call_count("images"), 0);
}

#[tokio::test]
async fn restarted_processor_publishes_once_per_event() {
    for _ in 0..25 {
        let (spawner, processor) = setup(K3D);
        let mut rx = processor.hub().subscribe();
        processor.start();
        processor.stop();
        processor.start();

        processor.hub().publish_readiness(true);

        next_images(&mut rx).await.expect("refresh after restart");
        assert!(no_images_within(&mut rx, Duration::from_millis(50)).await);
        assert_eq!(spawner.call_count("images"), 1);
    }
}

#[tokio::test]
async fn failed_refresh_publishes_nothing() {
    let (spawner, processor) = setup(K3D);
    spawner.on("images", MockReply::exit(1, "", "cannot access containerd socket"));
    let mut rx = processor.hub().subscribe();
    processor.start();

    processor.hub().publish_readiness(true);

    assert!(no_images_within(&mut rx, Duration::from_millis(300)).await);
    // the readiness update itself still applies
    assert!(processor.state().is_k8s_ready);
}

#[tokio::test]
async fn namespace_switch_republishes_when_ready() {
    let (spawner, processor) = setup(K3D);
    let mut rx = processor.hub().subscribe();
    processor.start();
    processor.hub().publish_readiness(true);
    next_images(&mut rx).await.expect("initial refresh");

    processor.set_namespace("buildkit").await.unwrap();

    next_images(&mut rx).await.expect("refresh after namespace switch");
    let last = spawner.calls().pop().unwrap();
    assert_eq!(&last[1..4], ["--namespace", "buildkit", "images"]);
}

#[tokio::test(start_paused = true)]
async fn polling_publishes_only_changes() {
    let (spawner, processor) = setup(K3D);
    let processor = processor.with_refresh_interval(Some(Duration::from_secs(5)));
    let mut rx = processor.hub().subscribe();
    processor.start();

    processor.hub().publish_readiness(true);
    next_images(&mut rx).await.expect("readiness refresh");

    // unchanged output: polls run but publish nothing
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(spawner.call_count("images") >= 3);
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    spawner.on(
        "images",
        MockReply::stdout(r#"{"ID":"c","Repository":"busybox","Tag":"latest","Size":"4 MiB"}"#),
    );
    let images = next_images(&mut rx).await.expect("changed list published");
    assert_eq!(images[0].image_name, "busybox");
}
