use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use wp_api_types::WalletAddress;
use wp_contract::{Address, ReceiptPolling, address};
use wp_devnet::{DevnetProvider, Faults};
use wp_provider::{Eip1193Provider, ProviderGateway, TokioTimer};
use wp_session::{
    ConnectionState, DedupPolicy, SessionConfig, SessionController, SessionError, WaveRecord,
};

const ALICE: Address = address!("00000000000000000000000000000000000a11ce");
const OXA: Address = address!("000000000000000000000000000000000000000a");
const OXB: Address = address!("000000000000000000000000000000000000000b");

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> SessionConfig {
    SessionConfig {
        receipt_polling: ReceiptPolling {
            interval: Duration::from_millis(1),
            max_attempts: Some(1_000),
        },
        ..SessionConfig::default()
    }
}

fn controller(devnet: Option<&Rc<DevnetProvider>>, config: SessionConfig) -> SessionController {
    init_tracing();
    let provider = devnet.map(|devnet| devnet.clone() as Rc<dyn Eip1193Provider>);
    SessionController::new(ProviderGateway::new(provider, Rc::new(TokioTimer)), config)
}

fn wave(sender: Address, seconds: u128, message: &str) -> WaveRecord {
    WaveRecord {
        sender_address: sender.to_checksum(None),
        timestamp_epoch_ms: seconds * 1000,
        message: message.to_owned(),
    }
}

#[tokio::test]
async fn bulk_fetch_then_live_event_keeps_arrival_order() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.seed_wave(OXA, 10, "hi");
    let session = controller(Some(&devnet), config());

    session.connect().await?;
    devnet.wave_from(OXB, 20, "yo");

    let snapshot = session.snapshot();
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(
        *snapshot.waves.items,
        vec![wave(OXA, 10, "hi"), wave(OXB, 20, "yo")]
    );
    assert_eq!(snapshot.waves.count, 2);
    assert_eq!(snapshot.waves.items[0].timestamp_epoch_ms, 10_000);
    Ok(())
}

#[tokio::test]
async fn blank_messages_never_reach_the_contract() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    let session = controller(Some(&devnet), config());
    session.connect().await?;
    let calls_before = devnet.request_count("eth_call");

    for blank in ["", "   ", "\n\t"] {
        let result = session.submit(blank).await;
        assert!(matches!(result, Err(SessionError::Validation(_))));
    }

    assert_eq!(devnet.request_count("eth_call"), calls_before);
    assert_eq!(devnet.request_count("eth_sendTransaction"), 0);
    assert_eq!(
        session.snapshot().validation_error.as_deref(),
        Some("Message can not be empty ):")
    );

    session.submit("hello").await?;
    assert_eq!(session.snapshot().validation_error, None);
    Ok(())
}

#[tokio::test]
async fn connect_without_provider_stays_disconnected() {
    let session = controller(None, config());

    assert_eq!(session.connect().await, Err(SessionError::NoProvider));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.restore().await, None);
    assert_eq!(session.snapshot().address, None);
}

#[tokio::test]
async fn submit_while_disconnected_leaves_log_untouched() {
    let session = controller(None, config());
    session.update_draft("hello");

    assert_eq!(session.submit("hello").await, Err(SessionError::NoProvider));
    assert_eq!(session.snapshot().waves.count, 0);
    assert_eq!(session.snapshot().draft, "hello");

    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.seed_wave(OXA, 10, "hi");
    let session = controller(Some(&devnet), config());

    assert!(matches!(session.submit("hello").await, Err(SessionError::Write(_))));
    assert_eq!(session.snapshot().waves.count, 0);
    assert_eq!(devnet.request_count("eth_sendTransaction"), 0);
}

#[tokio::test]
async fn rejected_connection_returns_to_disconnected() {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.set_faults(Faults {
        reject_connection: true,
        ..Faults::default()
    });
    let session = controller(Some(&devnet), config());
    let states = Rc::new(RefCell::new(Vec::new()));
    let sink = states.clone();
    session.observe(move |snapshot| sink.borrow_mut().push(snapshot.connection_state));

    assert_eq!(session.connect().await, Err(SessionError::UserRejected));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        *states.borrow(),
        vec![ConnectionState::Connecting, ConnectionState::Disconnected]
    );
    assert_eq!(devnet.active_subscriptions(), 0);
}

#[tokio::test]
async fn silent_restore_connects_without_prompting() {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.preauthorize();
    devnet.seed_wave(OXA, 10, "hi");
    let session = controller(Some(&devnet), config());

    let first = session.restore().await;
    let second = session.restore().await;

    let expected = WalletAddress(ALICE.to_checksum(None).to_lowercase());
    assert_eq!(first, Some(expected.clone()));
    assert_eq!(second, first);
    assert_eq!(devnet.prompt_count(), 0);
    assert_eq!(devnet.active_subscriptions(), 1);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(snapshot.address, Some(expected));
    assert_eq!(snapshot.wave_count, 1);
    assert_eq!(*snapshot.waves.items, vec![wave(OXA, 10, "hi")]);
}

#[tokio::test]
async fn restore_without_authorization_stays_disconnected() {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    let session = controller(Some(&devnet), config());

    assert_eq!(session.restore().await, None);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(devnet.prompt_count(), 0);
    assert_eq!(devnet.active_subscriptions(), 0);
}

#[tokio::test]
async fn submit_walks_through_submitting_and_clears_draft() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.set_clock(30);
    let session = controller(Some(&devnet), config());
    session.connect().await?;
    session.update_draft("hello");

    let states = Rc::new(RefCell::new(Vec::new()));
    let sink = states.clone();
    session.observe(move |snapshot| sink.borrow_mut().push(snapshot.connection_state));

    session.submit("hello").await?;

    let states = states.borrow();
    assert_eq!(states.first(), Some(&ConnectionState::Submitting));
    assert_eq!(states.last(), Some(&ConnectionState::Connected));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.draft, "");
    assert_eq!(snapshot.wave_count, 1);
    // Event delivered before the refetch: the refetch supersedes it.
    assert_eq!(*snapshot.waves.items, vec![wave(ALICE, 31, "hello")]);
    assert_eq!(devnet.request_count("eth_sendTransaction"), 1);
    Ok(())
}

#[tokio::test]
async fn late_event_after_refetch_duplicates_own_wave() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.set_clock(30);
    let session = controller(Some(&devnet), config());
    session.connect().await?;

    devnet.hold_logs(true);
    session.submit("hello").await?;
    devnet.hold_logs(false);

    assert_eq!(
        *session.snapshot().waves.items,
        vec![wave(ALICE, 31, "hello"), wave(ALICE, 31, "hello")]
    );
    Ok(())
}

#[tokio::test]
async fn tail_window_dedup_suppresses_the_late_duplicate() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.set_clock(30);
    let session = controller(
        Some(&devnet),
        SessionConfig {
            dedup: DedupPolicy::TailWindow(8),
            ..config()
        },
    );
    session.connect().await?;

    devnet.hold_logs(true);
    session.submit("hello").await?;
    devnet.hold_logs(false);
    devnet.wave_from(OXB, 40, "different");

    assert_eq!(
        *session.snapshot().waves.items,
        vec![wave(ALICE, 31, "hello"), wave(OXB, 40, "different")]
    );
    Ok(())
}

#[tokio::test]
async fn contract_errors_do_not_demote_the_session() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.seed_wave(OXA, 10, "hi");
    let session = controller(Some(&devnet), config());
    session.connect().await?;
    let before = session.snapshot().waves;

    devnet.set_faults(Faults {
        revert_transactions: true,
        ..Faults::default()
    });
    assert!(matches!(session.submit("nope").await, Err(SessionError::Reverted(_))));
    assert_eq!(session.connection_state(), ConnectionState::Connected);

    devnet.set_faults(Faults {
        fail_mining: true,
        ..Faults::default()
    });
    assert!(matches!(session.submit("dropped").await, Err(SessionError::MiningFailed(_))));
    assert_eq!(session.connection_state(), ConnectionState::Connected);

    devnet.set_faults(Faults {
        reject_transactions: true,
        ..Faults::default()
    });
    assert_eq!(session.submit("declined").await, Err(SessionError::UserRejected));

    assert_eq!(session.snapshot().waves, before);
    assert_eq!(session.snapshot().wave_count, 1);
    Ok(())
}

#[tokio::test]
async fn failed_history_read_keeps_log_empty_but_connects() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.seed_wave(OXA, 10, "hi");
    devnet.set_faults(Faults {
        fail_reads: true,
        ..Faults::default()
    });
    let session = controller(Some(&devnet), config());

    session.connect().await?;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(snapshot.waves.count, 0);
    assert_eq!(snapshot.wave_count, 0);

    devnet.wave_from(OXB, 20, "yo");
    assert_eq!(session.snapshot().waves.count, 1);
    Ok(())
}

#[tokio::test]
async fn reconnect_rebinds_but_keeps_one_subscription() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    let session = controller(Some(&devnet), config());

    session.connect().await?;
    session.connect().await?;

    assert_eq!(devnet.active_subscriptions(), 1);
    assert_eq!(devnet.prompt_count(), 2);
    Ok(())
}

#[tokio::test]
async fn dispose_and_drop_release_the_subscription() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    let session = controller(Some(&devnet), config());
    session.connect().await?;
    assert_eq!(devnet.active_subscriptions(), 1);

    session.dispose();
    session.dispose();
    devnet.wave_from(OXB, 20, "after dispose");

    assert_eq!(devnet.active_subscriptions(), 0);
    assert_eq!(session.snapshot().waves.count, 0);

    let session = controller(Some(&devnet), config());
    session.connect().await?;
    assert_eq!(devnet.active_subscriptions(), 1);
    drop(session);
    assert_eq!(devnet.active_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn observers_see_every_change_until_removed() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    let session = controller(Some(&devnet), config());
    session.connect().await?;

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let id = session.observe(move |snapshot| sink.borrow_mut().push(snapshot.waves.count));

    devnet.wave_from(OXA, 1, "one");
    devnet.wave_from(OXB, 2, "two");
    session.unobserve(id);
    devnet.wave_from(OXA, 3, "three");

    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(session.snapshot().waves.count, 3);
    Ok(())
}

#[tokio::test]
async fn wave_delivered_during_history_fetch_survives_the_bulk_load() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.seed_wave(OXA, 10, "hi");
    devnet.wave_during_next_history_read(OXB, 20, "yo");
    let session = controller(Some(&devnet), config());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    session.observe(move |snapshot| sink.borrow_mut().push(snapshot.waves.count));

    session.connect().await?;

    let snapshot = session.snapshot();
    assert_eq!(devnet.total_waves(), 2);
    assert_eq!(
        *snapshot.waves.items,
        vec![wave(OXA, 10, "hi"), wave(OXB, 20, "yo")]
    );
    assert_eq!(snapshot.wave_count, 2);
    // Once shown, the live wave never disappears again.
    let seen = seen.borrow();
    let first_shown = seen.iter().position(|count| *count > 0).unwrap_or(seen.len());
    assert!(seen[first_shown..].iter().all(|count| *count >= 1));
    Ok(())
}

#[tokio::test]
async fn wave_delivered_during_post_mine_refetch_is_kept() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    devnet.set_clock(30);
    let session = controller(Some(&devnet), config());
    session.connect().await?;

    devnet.wave_during_next_history_read(OXB, 40, "yo");
    session.submit("hello").await?;

    assert_eq!(
        *session.snapshot().waves.items,
        vec![wave(ALICE, 31, "hello"), wave(OXB, 40, "yo")]
    );
    Ok(())
}

#[tokio::test]
async fn submitting_ends_when_the_wave_is_mined() -> anyhow::Result<()> {
    let devnet = Rc::new(DevnetProvider::new(ALICE));
    let session = controller(Some(&devnet), config());
    session.connect().await?;

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    session.observe(move |snapshot| {
        sink.borrow_mut()
            .push((snapshot.connection_state, snapshot.wave_count))
    });

    session.submit("hello").await?;

    let seen = seen.borrow();
    assert!(seen.contains(&(ConnectionState::Submitting, 0)));
    let first_counted = seen
        .iter()
        .find(|(_, count)| *count == 1)
        .copied();
    assert_eq!(first_counted, Some((ConnectionState::Connected, 1)));
    assert!(!seen.contains(&(ConnectionState::Submitting, 1)));
    Ok(())
}
