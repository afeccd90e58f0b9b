use super::*;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use anyhow::anyhow;
use async_trait::async_trait;
use shared::domain::{PublicKey, ServiceId, TemplateId};
use tokio::{sync::Notify, time::timeout};

use crate::mail::MissingMailClientLoader;

const WAIT: Duration = Duration::from_secs(2);

#[derive(Clone, Default)]
struct Probe {
    sends: Arc<Mutex<Vec<ContactPayload>>>,
    inits: Arc<Mutex<Vec<String>>>,
    released: Arc<AtomicUsize>,
}

impl Probe {
    fn sends(&self) -> Vec<ContactPayload> {
        self.sends.lock().expect("sends lock").clone()
    }

    fn inits(&self) -> Vec<String> {
        self.inits.lock().expect("inits lock").clone()
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
enum SendBehavior {
    Accept,
    Reject(String),
    AcceptAfter(Arc<Notify>),
    Hang,
}

struct TestClient {
    probe: Probe,
    behavior: SendBehavior,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        self.probe.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailDispatchClient for TestClient {
    fn init(&self, public_key: &PublicKey) {
        self.probe
            .inits
            .lock()
            .expect("inits lock")
            .push(public_key.to_string());
    }

    async fn send(
        &self,
        _service_id: &ServiceId,
        _template_id: &TemplateId,
        payload: &ContactPayload,
    ) -> Result<()> {
        self.probe
            .sends
            .lock()
            .expect("sends lock")
            .push(payload.clone());
        match &self.behavior {
            SendBehavior::Accept => Ok(()),
            SendBehavior::Reject(reason) => Err(anyhow!(reason.clone())),
            SendBehavior::AcceptAfter(gate) => {
                gate.notified().await;
                Ok(())
            }
            SendBehavior::Hang => std::future::pending().await,
        }
    }
}

struct TestLoader {
    probe: Probe,
    behavior: SendBehavior,
    gate: Option<Arc<Notify>>,
    fail: bool,
}

impl TestLoader {
    fn new(probe: &Probe, behavior: SendBehavior) -> Self {
        Self {
            probe: probe.clone(),
            behavior,
            gate: None,
            fail: false,
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl MailClientLoader for TestLoader {
    async fn load(&self) -> Result<Arc<dyn MailDispatchClient>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(anyhow!("script blocked"));
        }
        Ok(Arc::new(TestClient {
            probe: self.probe.clone(),
            behavior: self.behavior.clone(),
        }))
    }
}

fn ready_config() -> MailConfig {
    MailConfig::from_parts(Some("service_test"), Some("template_test"), Some("pk_test"))
}

async fn mounted_with(
    config: MailConfig,
    options: ContactOptions,
    behavior: SendBehavior,
) -> (Arc<ContactController>, Probe) {
    let probe = Probe::default();
    let controller = ContactController::mount(
        config,
        options,
        Arc::new(TestLoader::new(&probe, behavior)),
    );
    let ready = timeout(WAIT, controller.wait_for_capability())
        .await
        .expect("mail client loads");
    assert!(ready);
    (controller, probe)
}

async fn mounted(behavior: SendBehavior) -> (Arc<ContactController>, Probe) {
    mounted_with(ready_config(), ContactOptions::default(), behavior).await
}

fn fill(controller: &ContactController, name: &str, email: &str, message: &str) {
    controller.set_field(ContactField::Name, name);
    controller.set_field(ContactField::Email, email);
    controller.set_field(ContactField::Message, message);
}

async fn wait_for_status(controller: &ContactController, status: SubmissionStatus) {
    let mut rx = controller.subscribe();
    timeout(WAIT, async {
        rx.wait_for(|state| state.submission == status)
            .await
            .map(|_| ())
    })
    .await
    .expect("status reached")
    .expect("controller alive");
}

#[tokio::test]
async fn blank_field_fails_validation_without_network_call() {
    let (controller, probe) = mounted(SendBehavior::Accept).await;
    fill(&controller, "", "a@b.com", "hi");

    let outcome = controller.submit().await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
    assert!(matches!(
        outcome,
        SubmitOutcome::Failed(SubmissionError::Validation { ref missing })
            if missing == &[ContactField::Name]
    ));
    let state = controller.state();
    assert_eq!(state.submission, SubmissionStatus::Failed);
    assert_eq!(state.fields.email, "a@b.com");
    assert!(probe.sends().is_empty());
}

#[tokio::test]
async fn whitespace_only_message_fails_validation() {
    let (controller, probe) = mounted(SendBehavior::Accept).await;
    fill(&controller, "Jane", "jane@example.com", "   ");

    let outcome = controller.submit().await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
    assert!(probe.sends().is_empty());
}

#[tokio::test]
async fn accepted_send_clears_fields() {
    let (controller, probe) = mounted(SendBehavior::Accept).await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let outcome = controller.submit().await;

    assert!(matches!(outcome, SubmitOutcome::Succeeded));
    let state = controller.state();
    assert_eq!(state.submission, SubmissionStatus::Succeeded);
    assert_eq!(state.fields, Default::default());
    assert_eq!(
        probe.sends(),
        vec![ContactPayload {
            from_name: "Jane".into(),
            from_email: "jane@example.com".into(),
            message: "Hello there".into(),
            to_name: DEFAULT_RECIPIENT_NAME.into(),
        }]
    );
}

#[tokio::test]
async fn rejected_send_preserves_fields() {
    let (controller, probe) = mounted(SendBehavior::Reject("service unavailable".into())).await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let outcome = controller.submit().await;

    match outcome {
        SubmitOutcome::Failed(SubmissionError::Dispatch(DispatchError::Transport(reason))) => {
            assert!(reason.contains("service unavailable"), "unexpected reason: {reason}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let state = controller.state();
    assert_eq!(state.submission, SubmissionStatus::Failed);
    assert_eq!(state.fields.name, "Jane");
    assert_eq!(state.fields.message, "Hello there");
    assert_eq!(probe.sends().len(), 1);
}

#[tokio::test]
async fn submit_before_client_loads_fails_instead_of_waiting() {
    let probe = Probe::default();
    let gate = Arc::new(Notify::new());
    let controller = ContactController::mount(
        ready_config(),
        ContactOptions::default(),
        Arc::new(TestLoader::new(&probe, SendBehavior::Accept).gated(Arc::clone(&gate))),
    );
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let outcome = timeout(WAIT, controller.submit())
        .await
        .expect("submit must not hang");

    assert!(matches!(
        outcome,
        SubmitOutcome::Failed(SubmissionError::Dispatch(
            DispatchError::CapabilityUnavailable
        ))
    ));
    assert_eq!(controller.state().submission, SubmissionStatus::Failed);
    assert_eq!(controller.state().fields.name, "Jane");
    assert!(probe.sends().is_empty());
}

#[tokio::test]
async fn failed_load_leaves_capability_unavailable() {
    let probe = Probe::default();
    let controller = ContactController::mount(
        ready_config(),
        ContactOptions::default(),
        Arc::new(TestLoader::new(&probe, SendBehavior::Accept).failing()),
    );
    tokio::task::yield_now().await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let outcome = controller.submit().await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Dispatch));
    assert!(!controller.capability_ready());
}

#[tokio::test]
async fn missing_loader_leaves_form_unable_to_send() {
    let controller = ContactController::mount(
        ready_config(),
        ContactOptions::default(),
        Arc::new(MissingMailClientLoader),
    );
    tokio::task::yield_now().await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let outcome = controller.submit().await;

    assert!(matches!(
        outcome,
        SubmitOutcome::Failed(SubmissionError::Dispatch(
            DispatchError::CapabilityUnavailable
        ))
    ));
    assert!(!controller.capability_ready());
    assert_eq!(controller.state().fields.name, "Jane");
}

#[tokio::test]
async fn missing_configuration_fails_without_network_call() {
    let config = MailConfig::from_parts(Some("service_test"), None, Some(""));
    let (controller, probe) = {
        let probe = Probe::default();
        let controller = ContactController::mount(
            config,
            ContactOptions::default(),
            Arc::new(TestLoader::new(&probe, SendBehavior::Accept)),
        );
        timeout(WAIT, controller.wait_for_capability())
            .await
            .expect("mail client loads");
        (controller, probe)
    };
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let outcome = controller.submit().await;

    assert!(matches!(
        outcome,
        SubmitOutcome::Failed(SubmissionError::Configuration { ref missing })
            if missing == &["template_id", "public_key"]
    ));
    assert_eq!(controller.state().submission, SubmissionStatus::Failed);
    assert!(probe.sends().is_empty());
    assert!(probe.inits().is_empty());
}

#[tokio::test]
async fn loaded_client_is_initialized_once_with_public_key() {
    let (controller, probe) = mounted(SendBehavior::Accept).await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");
    controller.submit().await;
    fill(&controller, "Jane", "jane@example.com", "Second note");
    controller.submit().await;

    assert_eq!(probe.inits(), vec!["pk_test".to_string()]);
    assert_eq!(probe.sends().len(), 2);
}

#[tokio::test]
async fn submit_while_in_flight_is_ignored() {
    let gate = Arc::new(Notify::new());
    let (controller, probe) = mounted(SendBehavior::AcceptAfter(Arc::clone(&gate))).await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let first = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit().await }
    });
    wait_for_status(&controller, SubmissionStatus::Submitting).await;

    assert!(matches!(controller.submit().await, SubmitOutcome::Ignored));
    assert_eq!(controller.state().submission, SubmissionStatus::Submitting);

    gate.notify_one();
    let outcome = timeout(WAIT, first)
        .await
        .expect("first submit settles")
        .expect("join");

    assert!(matches!(outcome, SubmitOutcome::Succeeded));
    assert_eq!(probe.sends().len(), 1);
    assert_eq!(controller.state().submission, SubmissionStatus::Succeeded);
    assert_eq!(controller.state().fields, Default::default());
}

#[tokio::test]
async fn terminal_states_accept_a_new_submit() {
    let (controller, probe) = mounted(SendBehavior::Accept).await;

    fill(&controller, "Jane", "", "Hello there");
    controller.submit().await;
    assert_eq!(controller.state().submission, SubmissionStatus::Failed);

    controller.set_field(ContactField::Email, "jane@example.com");
    assert!(matches!(controller.submit().await, SubmitOutcome::Succeeded));

    // Fields were cleared by the success, so an immediate resubmit is invalid.
    let outcome = controller.submit().await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
    assert_eq!(probe.sends().len(), 1);
}

#[tokio::test]
async fn settlement_after_unmount_leaves_state_untouched() {
    let gate = Arc::new(Notify::new());
    let (controller, probe) = mounted(SendBehavior::AcceptAfter(Arc::clone(&gate))).await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let pending = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit().await }
    });
    wait_for_status(&controller, SubmissionStatus::Submitting).await;

    controller.unmount();
    assert_eq!(probe.released(), 0, "in-flight send still holds the client");

    gate.notify_one();
    let outcome = timeout(WAIT, pending)
        .await
        .expect("pending submit settles")
        .expect("join");

    assert!(matches!(outcome, SubmitOutcome::Succeeded));
    let state = controller.state();
    assert_eq!(state.submission, SubmissionStatus::Submitting);
    assert_eq!(state.fields.name, "Jane");
    assert_eq!(probe.released(), 1);
}

#[tokio::test]
async fn unmount_releases_client_and_ignores_later_events() {
    let (controller, probe) = mounted(SendBehavior::Accept).await;

    controller.unmount();
    controller.unmount();

    assert_eq!(probe.released(), 1);
    assert!(!controller.is_mounted());
    assert!(!controller.capability_ready());

    controller.set_field(ContactField::Name, "Jane");
    assert_eq!(controller.state().fields.name, "");
    assert!(matches!(controller.submit().await, SubmitOutcome::Ignored));
}

#[tokio::test]
async fn unmount_during_pending_load_never_installs_client() {
    let probe = Probe::default();
    let gate = Arc::new(Notify::new());
    let controller = ContactController::mount(
        ready_config(),
        ContactOptions::default(),
        Arc::new(TestLoader::new(&probe, SendBehavior::Accept).gated(Arc::clone(&gate))),
    );
    tokio::task::yield_now().await;

    controller.unmount();
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!controller.capability_ready());
    assert!(probe.inits().is_empty());
}

#[tokio::test]
async fn dropping_controller_with_pending_load_is_clean() {
    let probe = Probe::default();
    let gate = Arc::new(Notify::new());
    let controller = ContactController::mount(
        ready_config(),
        ContactOptions::default(),
        Arc::new(TestLoader::new(&probe, SendBehavior::Accept).gated(Arc::clone(&gate))),
    );
    tokio::task::yield_now().await;

    drop(controller);
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(probe.inits().is_empty());
    assert_eq!(probe.released(), 0);
}

#[tokio::test]
async fn send_timeout_bounds_a_hung_send() {
    let options = ContactOptions {
        send_timeout: Some(Duration::from_millis(50)),
        ..ContactOptions::default()
    };
    let (controller, _probe) = mounted_with(ready_config(), options, SendBehavior::Hang).await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    let outcome = timeout(WAIT, controller.submit())
        .await
        .expect("timeout must fire");

    assert!(matches!(
        outcome,
        SubmitOutcome::Failed(SubmissionError::Dispatch(DispatchError::TimedOut {
            after_ms: 50
        }))
    ));
    assert_eq!(controller.state().submission, SubmissionStatus::Failed);
    assert_eq!(controller.state().fields.name, "Jane");
}

#[tokio::test]
async fn custom_recipient_name_reaches_payload() {
    let options = ContactOptions {
        recipient_name: "Portfolio Owner".into(),
        ..ContactOptions::default()
    };
    let (controller, probe) = mounted_with(ready_config(), options, SendBehavior::Accept).await;
    fill(&controller, "Jane", "jane@example.com", "Hello there");

    controller.submit().await;

    assert_eq!(probe.sends()[0].to_name, "Portfolio Owner");
}

#[tokio::test]
async fn host_field_names_map_to_fields() {
    let (controller, _probe) = mounted(SendBehavior::Accept).await;

    controller
        .set_field_by_name("email", "jane@example.com")
        .expect("known field");
    let err = controller
        .set_field_by_name("phone", "555")
        .expect_err("unknown field");

    assert_eq!(controller.state().fields.email, "jane@example.com");
    assert!(err.to_string().contains("phone"));
}

#[test]
fn failure_kinds_share_one_visible_message() {
    assert_eq!(status_message(SubmissionStatus::Idle), None);
    assert_eq!(status_message(SubmissionStatus::Submitting), Some(PENDING_MESSAGE));
    assert_eq!(status_message(SubmissionStatus::Succeeded), Some(SUCCESS_MESSAGE));
    assert_eq!(status_message(SubmissionStatus::Failed), Some(FAILURE_MESSAGE));
}
