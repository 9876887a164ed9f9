//! The transmission session: one advertising attempt at a time, driven
//! through start/stop with a debounced restart when an advertisement is
//! already active.

pub mod failure;

use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};

use futures::stream::{Stream, StreamExt};
use log::{debug, trace, warn};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::{
    AdvertiseCallback, Advertiser, Beacon, BeaconLayout, CapabilityGate, SessionEvent,
    SessionState, TransmitSettings,
};
use crate::common::codec;
use crate::constants::{APPLE_COMPANY_CODE, RESTART_DEBOUNCE};
use crate::{Error, Result};

/// Session state shared with the platform result callback, which may run on
/// any execution context.
#[derive(Debug)]
struct Shared {
    state: StdMutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap();
        if *state == next {
            return;
        }
        trace!("session state {:?} -> {:?}", *state, next);
        *state = next;
        drop(state);

        if let Err(lost) = self.events.send(SessionEvent::StateChanged(next)) {
            trace!("Lost session event, while nothing subscribed: {:?}", lost.0);
        }
    }
}

/// Owns the process-wide advertising lifecycle over an injected platform
/// [`Advertiser`]. Start/stop operations are serialized; the platform result
/// callback is the sole source of truth for leaving [`SessionState::Starting`].
pub struct Transmitter<A, G>
where
    A: Advertiser,
    G: CapabilityGate,
{
    advertiser: A,
    gate: G,
    layout: BeaconLayout,
    op_lock: Mutex<()>,
    shared: Arc<Shared>,
}

impl<A, G> Transmitter<A, G>
where
    A: Advertiser,
    G: CapabilityGate,
{
    pub fn new(advertiser: A, gate: G, layout: BeaconLayout) -> Self {
        let (events, _) = broadcast::channel(16);
        Transmitter {
            advertiser,
            gate,
            layout,
            op_lock: Mutex::new(()),
            shared: Arc::new(Shared {
                state: StdMutex::new(SessionState::Idle),
                events,
            }),
        }
    }

    /// The capability gate this session consults before touching hardware.
    pub fn gate(&self) -> &G {
        &self.gate
    }

    /// The layout all beacons handed to [`Transmitter::start`] are encoded
    /// with.
    pub fn layout(&self) -> &BeaconLayout {
        &self.layout
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// True iff an advertisement is currently on the air.
    pub fn is_broadcasting(&self) -> bool {
        self.shared.state() == SessionState::Advertising
    }

    /// A stream of state transitions. Subscribers that fall behind lose the
    /// oldest events.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = SessionEvent> + Send>> {
        let receiver = self.shared.events.subscribe();
        Box::pin(BroadcastStream::new(receiver).filter_map(|x| async move { x.ok() }))
    }

    /// Start advertising `beacon`. If an advertisement is already active it
    /// is stopped first and the new submission waits out the restart
    /// debounce, since controllers reject an immediate restart. Resolves once
    /// the platform reports the outcome.
    pub async fn start(&self, beacon: &Beacon, settings: TransmitSettings) -> Result<()> {
        if !self.gate.is_advertising_supported() {
            warn!("advertising unsupported, refusing start");
            return Err(Error::FeatureUnsupported);
        }

        let _op = self.op_lock.lock().await;

        if self.shared.state() != SessionState::Idle {
            debug!("advertisement already active, stopping before restart");
            self.shared.set_state(SessionState::StoppingForRestart);
            self.advertiser.stop_advertising().await;
            self.shared.set_state(SessionState::Idle);
            time::sleep(RESTART_DEBOUNCE).await;
        }

        if beacon.identifiers().is_empty() {
            return Err(Error::InvalidParameter(
                "beacon carries no identifier values".into(),
            ));
        }

        let company_code = beacon.manufacturer().unwrap_or(APPLE_COMPANY_CODE);
        let payload = codec::encode(&self.layout, beacon, company_code)?;

        let (result_tx, result_rx) = oneshot::channel();
        let shared = self.shared.clone();
        let on_result: AdvertiseCallback = Box::new(move |outcome| {
            let result = match outcome {
                Ok(()) => {
                    debug!("platform confirmed advertising start");
                    shared.set_state(SessionState::Advertising);
                    Ok(())
                }
                Err(code) => {
                    let err = failure::map_failure(code);
                    warn!("platform advertising start failed: {} (code {})", err, code);
                    shared.set_state(SessionState::Failed);
                    shared.set_state(SessionState::Idle);
                    Err(err)
                }
            };
            // The sender is consumed here, so the callback can only ever
            // resolve the pending start once.
            if result_tx.send(result).is_err() {
                trace!("advertise result arrived after the caller went away");
            }
        });

        debug!("submitting advertisement: {}", beacon);
        self.shared.set_state(SessionState::Starting);
        if let Err(e) = self
            .advertiser
            .start_advertising(&payload, &settings, on_result)
            .await
        {
            self.shared.set_state(SessionState::Idle);
            return Err(e);
        }

        match result_rx.await {
            Ok(result) => result,
            Err(_) => {
                // The platform dropped the callback without invoking it.
                self.shared.set_state(SessionState::Idle);
                Err(Error::InternalError)
            }
        }
    }

    /// Stop the active advertisement. A no-op when nothing is active;
    /// cancellation itself has no failure path.
    pub async fn stop(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;

        if self.shared.state() == SessionState::Idle {
            return Ok(());
        }

        debug!("stopping advertisement");
        self.advertiser.stop_advertising().await;
        self.shared.set_state(SessionState::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AdvertiseMode, AdvertisementPayload};
    use crate::constants::IBEACON_LAYOUT;
    use async_trait::async_trait;
    use tokio::time::Instant;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start {
            at: Instant,
            settings: TransmitSettings,
            block: Vec<u8>,
        },
        Stop {
            at: Instant,
        },
    }

    struct MockAdvertiser {
        outcome: StdMutex<std::result::Result<(), i32>>,
        calls: Arc<StdMutex<Vec<Call>>>,
    }

    impl MockAdvertiser {
        fn new(outcome: std::result::Result<(), i32>) -> Self {
            MockAdvertiser {
                outcome: StdMutex::new(outcome),
                calls: Arc::new(StdMutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Advertiser for &MockAdvertiser {
        async fn start_advertising(
            &self,
            payload: &AdvertisementPayload,
            settings: &TransmitSettings,
            on_result: AdvertiseCallback,
        ) -> crate::Result<()> {
            self.calls.lock().unwrap().push(Call::Start {
                at: Instant::now(),
                settings: *settings,
                block: payload.manufacturer_data.clone(),
            });
            on_result(*self.outcome.lock().unwrap());
            Ok(())
        }

        async fn stop_advertising(&self) {
            self.calls.lock().unwrap().push(Call::Stop { at: Instant::now() });
        }
    }

    struct StubGate {
        supported: bool,
    }

    impl CapabilityGate for StubGate {
        fn is_advertising_supported(&self) -> bool {
            self.supported
        }

        fn has_advertise_permission(&self) -> bool {
            true
        }

        fn is_bluetooth_enabled(&self) -> bool {
            true
        }
    }

    fn transmitter(advertiser: &MockAdvertiser) -> Transmitter<&MockAdvertiser, StubGate> {
        Transmitter::new(
            advertiser,
            StubGate { supported: true },
            BeaconLayout::parse(IBEACON_LAYOUT).unwrap(),
        )
    }

    fn beacon() -> Beacon {
        Beacon::builder()
            .uuid(Uuid::parse_str("2f234454-cf6d-4a0f-adf2-f4911ba9ffa6").unwrap())
            .major(1)
            .minor(2)
            .tx_power(-59)
            .build()
    }

    #[tokio::test]
    async fn start_reaches_advertising() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = transmitter(&advertiser);

        session.start(&beacon(), TransmitSettings::default()).await.unwrap();
        assert_eq!(session.state(), SessionState::Advertising);
        assert!(session.is_broadcasting());

        let calls = advertiser.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Start { block, .. } => assert_eq!(block.len(), 23),
            other => panic!("expected a start call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unsupported_platform_short_circuits() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = Transmitter::new(
            &advertiser,
            StubGate { supported: false },
            BeaconLayout::parse(IBEACON_LAYOUT).unwrap(),
        );

        let err = session
            .start(&beacon(), TransmitSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err, Error::FeatureUnsupported);
        assert!(advertiser.calls().is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn platform_failure_maps_and_returns_to_idle() {
        let advertiser =
            MockAdvertiser::new(Err(failure::ADVERTISE_FAILED_TOO_MANY_ADVERTISERS));
        let session = transmitter(&advertiser);

        let err = session
            .start(&beacon(), TransmitSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err, Error::TooManyAdvertisers);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_broadcasting());
    }

    #[tokio::test]
    async fn codec_failure_never_touches_platform() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = transmitter(&advertiser);
        let incomplete = Beacon::builder().uuid(Uuid::nil()).build();

        let err = session
            .start(&incomplete, TransmitSettings::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::IdentifierCountMismatch {
                expected: 3,
                actual: 1
            }
        );
        assert!(advertiser.calls().is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn empty_identity_is_an_invalid_parameter() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = transmitter(&advertiser);

        let err = session
            .start(&Beacon::builder().build(), TransmitSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(advertiser.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_waits_out_the_debounce() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = transmitter(&advertiser);

        session.start(&beacon(), TransmitSettings::default()).await.unwrap();
        session.start(&beacon(), TransmitSettings::default()).await.unwrap();

        let calls = advertiser.calls();
        assert_eq!(calls.len(), 3);
        let stopped_at = match &calls[1] {
            Call::Stop { at } => *at,
            other => panic!("expected a stop call, got {:?}", other),
        };
        let restarted_at = match &calls[2] {
            Call::Start { at, .. } => *at,
            other => panic!("expected a start call, got {:?}", other),
        };
        assert!(restarted_at - stopped_at >= RESTART_DEBOUNCE);
        assert!(session.is_broadcasting());
    }

    #[tokio::test]
    async fn stop_is_idempotent_when_idle() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = transmitter(&advertiser);

        session.stop().await.unwrap();
        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(advertiser.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_cancels_the_active_advertisement() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = transmitter(&advertiser);

        session.start(&beacon(), TransmitSettings::default()).await.unwrap();
        session.stop().await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_broadcasting());
        assert!(matches!(advertiser.calls()[1], Call::Stop { .. }));
    }

    #[tokio::test]
    async fn settings_reach_the_platform() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = transmitter(&advertiser);
        let settings = TransmitSettings {
            mode: Some(AdvertiseMode::LowLatency),
            tx_power_level: None,
        };

        session.start(&beacon(), settings).await.unwrap();
        match &advertiser.calls()[0] {
            Call::Start { settings: seen, .. } => assert_eq!(*seen, settings),
            other => panic!("expected a start call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn events_report_the_lifecycle() {
        let advertiser = MockAdvertiser::new(Ok(()));
        let session = transmitter(&advertiser);
        let mut events = session.events();

        session.start(&beacon(), TransmitSettings::default()).await.unwrap();
        assert_eq!(
            events.next().await,
            Some(SessionEvent::StateChanged(SessionState::Starting))
        );
        assert_eq!(
            events.next().await,
            Some(SessionEvent::StateChanged(SessionState::Advertising))
        );
    }
}
