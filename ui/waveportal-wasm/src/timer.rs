use async_trait::async_trait;
use std::time::Duration;
use wp_provider::Timer;

/// `setTimeout`-backed sleep for receipt polling.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlooTimer;

#[async_trait(?Send)]
impl Timer for GlooTimer {
    async fn sleep(&self, duration: Duration) {
        gloo_timers::future::sleep(duration).await;
    }
}
