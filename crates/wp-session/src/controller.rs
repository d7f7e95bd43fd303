use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};
use wp_api_types::{ConnectionState, RawWaveRecord, SessionError, WalletAddress, WaveRecord};
use wp_contract::{ContractHandle, NEW_WAVE_EVENT, Subscription, WAVE_PORTAL_INTERFACE};
use wp_provider::ProviderGateway;
use wp_wave_log::{WaveLog, WaveLogSnapshot};

use crate::config::SessionConfig;

pub type ObserverId = u64;

type Observer = Rc<dyn Fn(&SessionSnapshot)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connection_state: ConnectionState,
    pub address: Option<WalletAddress>,
    pub wave_count: u64,
    pub waves: WaveLogSnapshot,
    pub validation_error: Option<String>,
    pub draft: String,
}

#[derive(Default)]
struct SessionState {
    connection: ConnectionState,
    wave_count: u64,
    validation_error: Option<String>,
    draft: String,
    in_flight: usize,
    contract: Option<Rc<ContractHandle>>,
    subscription: Option<Subscription>,
    disposed: bool,
}

struct Shared {
    gateway: ProviderGateway,
    config: SessionConfig,
    log: WaveLog,
    state: RefCell<SessionState>,
    observers: RefCell<Vec<(ObserverId, Observer)>>,
    next_observer: Cell<ObserverId>,
}

impl Shared {
    fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.borrow();
        SessionSnapshot {
            connection_state: state.connection,
            address: self.gateway.session().address,
            wave_count: state.wave_count,
            waves: self.log.snapshot(),
            validation_error: state.validation_error.clone(),
            draft: state.draft.clone(),
        }
    }

    fn publish(&self) {
        if self.state.borrow().disposed {
            return;
        }

        let snapshot = self.snapshot();
        let observers: Vec<Observer> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(&snapshot);
        }
    }

    fn on_new_wave(&self, raw: RawWaveRecord) {
        if self.state.borrow().disposed {
            return;
        }

        info!("NewWave {} {} {}", raw.waver, raw.timestamp, raw.message);
        if self.log.append(WaveRecord::from(raw)) {
            self.publish();
        }
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.state.borrow_mut().connection = connection;
        self.publish();
    }
}

/// Keeps the `Submitting` sub-state accurate even if a submit future is dropped mid-flight.
struct InFlight<'a> {
    shared: &'a Shared,
}

impl<'a> InFlight<'a> {
    fn begin(shared: &'a Shared) -> Self {
        {
            let mut state = shared.state.borrow_mut();
            state.in_flight += 1;
            state.connection = ConnectionState::Submitting;
        }
        shared.publish();
        Self { shared }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.borrow_mut();
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.in_flight == 0 && state.connection == ConnectionState::Submitting {
                state.connection = ConnectionState::Connected;
            }
        }
        self.shared.publish();
    }
}

pub struct SessionController {
    shared: Rc<Shared>,
}

impl SessionController {
    pub fn new(gateway: ProviderGateway, config: SessionConfig) -> Self {
        let log = WaveLog::new(config.dedup);
        Self {
            shared: Rc::new(Shared {
                gateway,
                config,
                log,
                state: RefCell::new(SessionState::default()),
                observers: RefCell::new(Vec::new()),
                next_observer: Cell::new(1),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.borrow().connection
    }

    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&SessionSnapshot) + 'static,
    {
        let id = self.shared.next_observer.get();
        self.shared.next_observer.set(id + 1);
        self.shared
            .observers
            .borrow_mut()
            .push((id, Rc::new(observer)));
        id
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.shared
            .observers
            .borrow_mut()
            .retain(|(observer_id, _)| *observer_id != id);
    }

    /// Silent reconnection on load: no prompt, only an already-authorized account.
    pub async fn restore(&self) -> Option<WalletAddress> {
        if !self.shared.gateway.probe().available {
            return None;
        }

        let account = self.shared.gateway.authorized_account().await?;
        self.enter_connected().await;
        Some(account)
    }

    pub async fn connect(&self) -> Result<WalletAddress, SessionError> {
        if !self.shared.gateway.probe().available {
            warn!("connect attempted without a wallet provider");
            return Err(SessionError::NoProvider);
        }

        let previous = self.connection_state();
        if !previous.is_connected() {
            self.shared.set_connection(ConnectionState::Connecting);
        }

        match self.shared.gateway.request_connection().await {
            Ok(account) => {
                self.enter_connected().await;
                Ok(account)
            }
            Err(err) => {
                warn!("wallet connection failed: {err}");
                self.shared.set_connection(previous);
                Err(err)
            }
        }
    }

    pub fn update_draft(&self, message: &str) {
        self.shared.state.borrow_mut().draft = message.to_owned();
        self.shared.publish();
    }

    /// count, send, wait for mining, count again, refetch the log.
    /// `Submitting` ends once the transaction is mined; the refreshes run as `Connected`.
    pub async fn submit(&self, message: &str) -> Result<(), SessionError> {
        if message.trim().is_empty() {
            info!("Message cannot be empty");
            let err = SessionError::empty_message();
            self.shared.state.borrow_mut().validation_error = Some(err.to_string());
            self.shared.publish();
            return Err(err);
        }

        let contract = {
            let mut state = self.shared.state.borrow_mut();
            state.validation_error = None;
            state.contract.clone()
        };
        let Some(contract) = contract else {
            self.shared.publish();
            let err = if self.shared.gateway.provider().is_none() {
                SessionError::NoProvider
            } else {
                SessionError::Write("wallet is not connected".to_owned())
            };
            warn!("wave not sent: {err}");
            return Err(err);
        };

        self.shared.state.borrow_mut().draft.clear();
        let mined = {
            let _in_flight = InFlight::begin(&self.shared);
            self.send_wave(&contract, message).await
        };
        if let Err(err) = mined {
            warn!("wave failed: {err}");
            return Err(err);
        }

        self.refresh_count(&contract).await;
        self.refresh_waves(&contract).await;
        Ok(())
    }

    /// Cancels the live subscription and detaches observers. Safe to call twice.
    pub fn dispose(&self) {
        let subscription = {
            let mut state = self.shared.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.subscription.take()
        };
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        self.shared.observers.borrow_mut().clear();
        debug!("session disposed");
    }

    async fn send_wave(&self, contract: &ContractHandle, message: &str) -> Result<(), SessionError> {
        self.refresh_count(contract).await;

        let tx = contract
            .submit_wave(message, self.shared.config.gas_limit)
            .await?;
        contract
            .await_mined(&tx, self.shared.config.receipt_polling)
            .await?;
        Ok(())
    }

    async fn enter_connected(&self) {
        let contract = Rc::new(ContractHandle::bind(
            self.shared.config.contract_address,
            &WAVE_PORTAL_INTERFACE,
            self.shared.gateway.signer(),
        ));

        {
            let mut state = self.shared.state.borrow_mut();
            state.contract = Some(contract.clone());
            state.connection = if state.in_flight > 0 {
                ConnectionState::Submitting
            } else {
                ConnectionState::Connected
            };
        }
        self.shared.publish();

        self.ensure_subscription(&contract).await;
        self.refresh_waves(&contract).await;
        self.refresh_count(&contract).await;
    }

    async fn ensure_subscription(&self, contract: &ContractHandle) {
        {
            let state = self.shared.state.borrow();
            if state.disposed || state.subscription.is_some() {
                return;
            }
        }

        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        let subscription = contract
            .subscribe(NEW_WAVE_EVENT, move |raw| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_new_wave(raw);
                }
            })
            .await;

        match subscription {
            Ok(subscription) => {
                let mut state = self.shared.state.borrow_mut();
                if state.disposed || state.subscription.is_some() {
                    // Lost a race with dispose or a concurrent connect.
                    drop(state);
                    subscription.cancel();
                } else {
                    state.subscription = Some(subscription);
                }
            }
            Err(err) => warn!("live wave subscription failed: {err}"),
        }
    }

    async fn refresh_waves(&self, contract: &ContractHandle) {
        let mark = self.shared.log.mark();
        match contract.read_all_waves().await {
            Ok(waves) => {
                self.shared.log.load_bulk_since(waves, mark);
                self.shared.publish();
            }
            Err(err) => warn!("failed to load waves: {err}"),
        }
    }

    async fn refresh_count(&self, contract: &ContractHandle) {
        match contract.read_total_waves().await {
            Ok(count) => {
                info!("Retrieved total wave count... {count}");
                self.shared.state.borrow_mut().wave_count = count;
                self.shared.publish();
            }
            Err(err) => warn!("failed to read wave count: {err}"),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}
