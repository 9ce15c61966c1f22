//! Drives one popup login to exactly one outcome.
//!
//! An `Attempt` owns everything it registers: the message listener, the
//! liveness poll and the popup itself. Whichever of "message accepted" or
//! "popup found closed" happens first settles it; everything after that is
//! ignored, and the watchers are released on every exit path.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::{Auth, LoginControl};
use crate::models::UserInfo;

use super::channel::{Listener, MessageChannel};
use super::context::{ContextOpener, SecondaryContext, WindowFeatures};
use super::message::{HandshakeMessage, InboundEnvelope, OriginPolicy};

/// How often the popup is checked for closure.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("could not get the login URL: {0}")]
    LoginUrl(String),

    #[error("could not open the login window: {0}")]
    OpenContext(String),

    #[error("login was rejected by the provider: {0}")]
    Provider(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("login finished without a credential")]
    MissingCredential,

    #[error("could not confirm the session: {0}")]
    Reconciliation(String),

    #[error("a login is already in progress")]
    AlreadyInProgress,
}

impl LoginError {
    /// Whether the UI should interrupt the user with this error.
    pub fn is_alert(&self) -> bool {
        !matches!(self, LoginError::AlreadyInProgress)
    }

    /// Text for the blocking alert.
    pub fn alert_message(&self) -> String {
        match self {
            LoginError::LoginUrl(_) | LoginError::OpenContext(_) => {
                "Failed to load the login page.".to_string()
            }
            LoginError::Provider(reason) => format!("Login failed: {}", reason),
            LoginError::TokenExchange(_)
            | LoginError::MissingCredential
            | LoginError::Reconciliation(_) => "Login failed. Please try again.".to_string(),
            LoginError::AlreadyInProgress => "Login is already in progress.".to_string(),
        }
    }
}

/// Terminal result of `begin_login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success(UserInfo),
    Failed(LoginError),
    /// The user closed the popup before any result arrived.
    Cancelled,
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success(_))
    }
}

/// What settled an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Signal {
    Message(HandshakeMessage),
    Closed,
}

enum Event {
    Message(InboundEnvelope),
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Settled,
}

/// One in-flight login.
struct Attempt<'a, C: SecondaryContext> {
    context: C,
    listener: Listener,
    poll: Option<Interval>,
    policy: &'a OriginPolicy,
    phase: Phase,
}

impl<'a, C: SecondaryContext> Attempt<'a, C> {
    fn new(context: C, listener: Listener, policy: &'a OriginPolicy, period: Duration) -> Self {
        let mut poll = time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            context,
            listener,
            poll: Some(poll),
            policy,
            phase: Phase::Pending,
        }
    }

    /// Wait for the first settling event, then release every watcher.
    async fn settle(&mut self) -> Signal {
        loop {
            let event = tokio::select! {
                biased;
                Some(envelope) = self.listener.recv() => Event::Message(envelope),
                _ = tick(&mut self.poll) => Event::Poll,
            };
            if let Some(signal) = self.handle(event) {
                self.release();
                return signal;
            }
        }
    }

    /// Apply one event. Returns the signal only for the event that settles.
    fn handle(&mut self, event: Event) -> Option<Signal> {
        if self.phase == Phase::Settled {
            debug!("Attempt already settled, ignoring event");
            return None;
        }

        let signal = match event {
            Event::Message(envelope) => {
                if !self.policy.accepts(&envelope.origin) {
                    warn!(origin = %envelope.origin, "Discarding message from unexpected origin");
                    return None;
                }
                Signal::Message(HandshakeMessage::parse(&envelope.data)?)
            }
            Event::Poll => {
                if !self.context.is_closed() {
                    return None;
                }
                Signal::Closed
            }
        };

        self.phase = Phase::Settled;
        Some(signal)
    }

    /// Stop listening, stop polling and close the popup. Idempotent.
    fn release(&mut self) {
        self.listener.release();
        self.poll = None;
        if !self.context.is_closed() {
            self.context.close();
        }
    }
}

impl<C: SecondaryContext> Drop for Attempt<'_, C> {
    fn drop(&mut self) {
        self.release();
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Runs popup logins against the identity provider.
pub struct HandshakeCoordinator<O: ContextOpener> {
    auth: Auth,
    channel: MessageChannel,
    opener: O,
    policy: OriginPolicy,
    poll_interval: Duration,
    features: WindowFeatures,
    control: LoginControl,
}

impl<O: ContextOpener> HandshakeCoordinator<O> {
    pub fn new(auth: Auth, channel: MessageChannel, opener: O, policy: OriginPolicy) -> Self {
        Self {
            auth,
            channel,
            opener,
            policy,
            poll_interval: DEFAULT_POLL_INTERVAL,
            features: WindowFeatures::default(),
            control: LoginControl::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_window_features(mut self, features: WindowFeatures) -> Self {
        self.features = features;
        self
    }

    /// The login control this coordinator keeps busy while an attempt runs.
    pub fn control(&self) -> &LoginControl {
        &self.control
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Run one login attempt to completion. Never fails; see `LoginOutcome`.
    pub async fn begin_login(&self) -> LoginOutcome {
        let Some(_busy) = self.control.begin() else {
            debug!("Login requested while another attempt is pending");
            return LoginOutcome::Failed(LoginError::AlreadyInProgress);
        };

        info!("Login attempt started");
        let outcome = self.run().await;
        match &outcome {
            LoginOutcome::Success(user) => info!(user_id = user.id, "Login succeeded"),
            LoginOutcome::Failed(e) => warn!(error = %e, "Login failed"),
            LoginOutcome::Cancelled => info!("Login cancelled by user"),
        }
        outcome
    }

    async fn run(&self) -> LoginOutcome {
        let login_url = match self.auth.api().login_url().await {
            Ok(url) => url,
            Err(e) => return LoginOutcome::Failed(LoginError::LoginUrl(format!("{e:#}"))),
        };

        // Listen before opening so an instant reply is not lost.
        let listener = self.channel.subscribe();
        let context = match self.opener.open(&login_url, &self.features) {
            Ok(context) => context,
            Err(e) => return LoginOutcome::Failed(LoginError::OpenContext(format!("{e:#}"))),
        };
        debug!(features = %self.features, "Login window opened");

        let signal = {
            let mut attempt = Attempt::new(context, listener, &self.policy, self.poll_interval);
            attempt.settle().await
        };

        match signal {
            Signal::Closed => LoginOutcome::Cancelled,
            Signal::Message(HandshakeMessage::Error { error }) => {
                LoginOutcome::Failed(LoginError::Provider(error))
            }
            Signal::Message(HandshakeMessage::Code { code }) => self.exchange(&code).await,
            Signal::Message(HandshakeMessage::Success {
                user_info,
                access_token,
            }) => self.complete(access_token, user_info).await,
        }
    }

    async fn exchange(&self, code: &str) -> LoginOutcome {
        match self.auth.api().exchange_code(code).await {
            Ok(resp) => self.complete(Some(resp.access_token), Some(resp.user_info)).await,
            Err(e) => LoginOutcome::Failed(LoginError::TokenExchange(format!("{e:#}"))),
        }
    }

    /// Store the credential, merge the user optimistically, then confirm.
    async fn complete(&self, token: Option<String>, user_info: Option<UserInfo>) -> LoginOutcome {
        let store = self.auth.store();
        let previous_token = store.get();
        let previous_state = self.auth.snapshot();

        let candidate = match token {
            Some(token) => {
                store.set(&token);
                token
            }
            None => match &previous_token {
                Some(existing) => existing.clone(),
                None => return LoginOutcome::Failed(LoginError::MissingCredential),
            },
        };

        if let Some(user) = user_info {
            self.auth.set_user_from_login(user);
        }

        match self.auth.reconcile().await {
            Ok(user) => LoginOutcome::Success(user),
            Err(e) => {
                if previous_token.as_deref() == Some(candidate.as_str()) {
                    self.auth.clear_session();
                } else {
                    match &previous_token {
                        Some(token) => store.set(token),
                        None => store.clear(),
                    }
                    self.auth.restore(&previous_state);
                }
                LoginOutcome::Failed(LoginError::Reconciliation(format!("{e:#}")))
            }
        }
    }
}
