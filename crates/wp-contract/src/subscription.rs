use std::rc::Rc;
use tracing::debug;
use wp_provider::Eip1193Provider;

/// Live event registration. Released on `cancel()` or drop, whichever comes first.
pub struct Subscription {
    active: Option<(Rc<dyn Eip1193Provider>, String)>,
}

impl Subscription {
    pub(crate) fn new(provider: Rc<dyn Eip1193Provider>, id: String) -> Self {
        Self {
            active: Some((provider, id)),
        }
    }

    pub fn inert() -> Self {
        Self { active: None }
    }

    pub fn id(&self) -> Option<&str> {
        self.active.as_ref().map(|(_, id)| id.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some((provider, id)) = self.active.take() {
            debug!("unsubscribing {id}");
            provider.unsubscribe(&id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
