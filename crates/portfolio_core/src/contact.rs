//! Contact-form submission pipeline.
//!
//! `ContactController` owns the form fields and the submission status, and
//! drives at most one send at a time through the mail-dispatch capability.
//! Every failure is absorbed into `SubmissionStatus::Failed`.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use anyhow::Result;
use shared::{
    domain::{ContactField, ContactFormState, SubmissionStatus},
    error::{DispatchError, FailureKind, SubmissionError, UnknownFieldError},
    protocol::ContactPayload,
};
use tokio::{sync::watch, task::AbortHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::{MailConfig, MailServiceConfig, DEFAULT_RECIPIENT_NAME},
    mail::{MailCapability, MailClientLoader, MailDispatchClient},
};

pub const PENDING_MESSAGE: &str = "Sending your message...";
pub const SUCCESS_MESSAGE: &str = "Thanks! Your message has been sent.";
pub const FAILURE_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Text shown under the form for each status. Every failure kind shares one
/// message.
pub fn status_message(status: SubmissionStatus) -> Option<&'static str> {
    match status {
        SubmissionStatus::Idle => None,
        SubmissionStatus::Submitting => Some(PENDING_MESSAGE),
        SubmissionStatus::Succeeded => Some(SUCCESS_MESSAGE),
        SubmissionStatus::Failed => Some(FAILURE_MESSAGE),
    }
}

#[derive(Debug, Clone)]
pub struct ContactOptions {
    pub recipient_name: String,
    /// `None` waits on the dispatch service indefinitely.
    pub send_timeout: Option<Duration>,
}

impl Default for ContactOptions {
    fn default() -> Self {
        Self {
            recipient_name: DEFAULT_RECIPIENT_NAME.into(),
            send_timeout: None,
        }
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Succeeded,
    Failed(SubmissionError),
    /// A submission was already in flight, or the form is unmounted.
    Ignored,
}

impl SubmitOutcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            SubmitOutcome::Failed(err) => Some(err.kind()),
            SubmitOutcome::Succeeded | SubmitOutcome::Ignored => None,
        }
    }
}

enum Attempt {
    Ignored,
    Rejected(SubmissionError),
    Dispatch {
        payload: ContactPayload,
        service: MailServiceConfig,
    },
}

pub struct ContactController {
    config: MailConfig,
    options: ContactOptions,
    state: watch::Sender<ContactFormState>,
    capability: watch::Sender<MailCapability>,
    mounted: AtomicBool,
    load_task: OnceLock<AbortHandle>,
}

impl ContactController {
    /// Creates the controller and starts loading the dispatch client in the
    /// background. Must be called from within a tokio runtime.
    pub fn mount(
        config: MailConfig,
        options: ContactOptions,
        loader: Arc<dyn MailClientLoader>,
    ) -> Arc<Self> {
        if let MailConfig::Missing { missing } = &config {
            error!(
                ?missing,
                "mail service configuration is incomplete; contact submissions will fail"
            );
        }

        let (state, _) = watch::channel(ContactFormState::default());
        let (capability, _) = watch::channel(MailCapability::NotReady);
        let controller = Arc::new(Self {
            config,
            options,
            state,
            capability,
            mounted: AtomicBool::new(true),
            load_task: OnceLock::new(),
        });

        let weak = Arc::downgrade(&controller);
        let task = tokio::spawn(async move {
            let loaded = loader.load().await;
            match weak.upgrade() {
                Some(controller) => controller.install(loaded),
                None => debug!("contact form unmounted before the mail client loaded"),
            }
        });
        let _ = controller.load_task.set(task.abort_handle());

        controller
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ContactFormState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ContactFormState> {
        self.state.subscribe()
    }

    pub fn capability_ready(&self) -> bool {
        self.capability.borrow().is_ready()
    }

    /// Resolves once the dispatch client is installed. Never resolves if
    /// loading failed; callers bound it with a timeout.
    pub async fn wait_for_capability(&self) -> bool {
        self.capability
            .subscribe()
            .wait_for(MailCapability::is_ready)
            .await
            .is_ok()
    }

    pub fn set_field(&self, field: ContactField, value: impl Into<String>) {
        if !self.is_mounted() {
            return;
        }
        let value = value.into();
        self.state.send_if_modified(|state| {
            if state.fields.get(field) == value {
                false
            } else {
                state.fields.set(field, value);
                true
            }
        });
    }

    pub fn set_field_by_name(
        &self,
        name: &str,
        value: impl Into<String>,
    ) -> std::result::Result<(), UnknownFieldError> {
        let field = name.parse::<ContactField>()?;
        self.set_field(field, value);
        Ok(())
    }

    /// Runs one submission attempt to completion. A submit received while
    /// another is in flight returns `Ignored` without touching state.
    pub async fn submit(&self) -> SubmitOutcome {
        if !self.is_mounted() {
            debug!("submit ignored; contact form is unmounted");
            return SubmitOutcome::Ignored;
        }

        let attempt_id = Uuid::new_v4();
        match self.begin() {
            Attempt::Ignored => {
                debug!(%attempt_id, "submit ignored; a submission is already in flight");
                SubmitOutcome::Ignored
            }
            Attempt::Rejected(err) => {
                log_failure(attempt_id, &err);
                SubmitOutcome::Failed(err)
            }
            Attempt::Dispatch { payload, service } => {
                debug!(%attempt_id, service_id = %service.service_id, "sending contact message");
                let result = self.dispatch(&service, &payload).await;
                self.settle(attempt_id, result.map_err(SubmissionError::from))
            }
        }
    }

    /// Releases the dispatch client and stops any pending load. Later
    /// settlements of an in-flight send leave the state untouched.
    pub fn unmount(&self) {
        if !self.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.load_task.get() {
            task.abort();
        }
        let released = self.capability.send_replace(MailCapability::NotReady);
        if released.is_ready() {
            debug!("mail dispatch client released");
        }
        info!("contact form unmounted");
    }

    fn install(&self, loaded: Result<Arc<dyn MailDispatchClient>>) {
        let client = match loaded {
            Ok(client) => client,
            Err(err) => {
                warn!("mail dispatch client failed to load: {err:#}");
                return;
            }
        };
        if !self.is_mounted() {
            return;
        }

        if let Some(service) = self.config.service() {
            client.init(&service.public_key);
        }

        let installed = self.capability.send_if_modified(|capability| {
            if !self.mounted.load(Ordering::SeqCst) {
                return false;
            }
            *capability = MailCapability::Ready(client);
            true
        });
        if installed {
            info!("mail dispatch client ready");
        }
    }

    fn begin(&self) -> Attempt {
        let mut attempt = Attempt::Ignored;
        self.state.send_if_modified(|state| {
            if state.submission == SubmissionStatus::Submitting {
                return false;
            }

            let missing = state.fields.blank_fields();
            if !missing.is_empty() {
                attempt = Attempt::Rejected(SubmissionError::Validation { missing });
                state.submission = SubmissionStatus::Failed;
                return true;
            }

            match &self.config {
                MailConfig::Missing { missing } => {
                    attempt = Attempt::Rejected(SubmissionError::Configuration {
                        missing: missing.clone(),
                    });
                    state.submission = SubmissionStatus::Failed;
                }
                MailConfig::Ready(service) => {
                    attempt = Attempt::Dispatch {
                        payload: ContactPayload::from_fields(
                            &state.fields,
                            &self.options.recipient_name,
                        ),
                        service: service.clone(),
                    };
                    state.submission = SubmissionStatus::Submitting;
                }
            }
            true
        });
        attempt
    }

    async fn dispatch(
        &self,
        service: &MailServiceConfig,
        payload: &ContactPayload,
    ) -> std::result::Result<(), DispatchError> {
        let client = self.capability.borrow().client();
        let Some(client) = client else {
            return Err(DispatchError::CapabilityUnavailable);
        };

        let send = client.send(&service.service_id, &service.template_id, payload);
        let result = match self.options.send_timeout {
            Some(limit) => match tokio::time::timeout(limit, send).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(DispatchError::TimedOut {
                        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            },
            None => send.await,
        };
        result.map_err(|err| DispatchError::Transport(format!("{err:#}")))
    }

    fn settle(
        &self,
        attempt_id: Uuid,
        result: std::result::Result<(), SubmissionError>,
    ) -> SubmitOutcome {
        let succeeded = result.is_ok();
        let applied = self.state.send_if_modified(|state| {
            if !self.mounted.load(Ordering::SeqCst)
                || state.submission != SubmissionStatus::Submitting
            {
                return false;
            }
            if succeeded {
                state.fields.clear();
                state.submission = SubmissionStatus::Succeeded;
            } else {
                state.submission = SubmissionStatus::Failed;
            }
            true
        });
        if !applied {
            debug!(%attempt_id, "submission settled after unmount; state left untouched");
        }

        match result {
            Ok(()) => {
                info!(%attempt_id, "contact message sent");
                SubmitOutcome::Succeeded
            }
            Err(err) => {
                log_failure(attempt_id, &err);
                SubmitOutcome::Failed(err)
            }
        }
    }
}

impl Drop for ContactController {
    fn drop(&mut self) {
        if let Some(task) = self.load_task.get() {
            task.abort();
        }
    }
}

fn log_failure(attempt_id: Uuid, err: &SubmissionError) {
    let kind = err.kind().as_str();
    match err.kind() {
        FailureKind::Validation => debug!(%attempt_id, kind, "contact submission rejected: {err}"),
        FailureKind::Configuration => {
            error!(%attempt_id, kind, "contact submission blocked by deployment config: {err}")
        }
        FailureKind::Dispatch => warn!(%attempt_id, kind, "contact submission failed: {err}"),
    }
}

#[cfg(test)]
#[path = "tests/contact_tests.rs"]
mod tests;
