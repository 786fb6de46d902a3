//! Drives one customer message through the completion service.
//!
//! For each inbound message: find or open the session, append the turn,
//! start a run, poll until it completes while feeding tool outputs back,
//! then render the newest assistant turn into reply segments. One call of
//! [`RunOrchestrator::handle_message`] is one full exchange; every wait is
//! an await point, so dropping the future abandons the exchange cleanly.

use std::sync::Arc;
use std::time::Duration;

use mostrador_core::domain::customer::CustomerProfile;
use mostrador_core::domain::reply::ReplySegment;
use mostrador_engine::CustomerDirectory;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assistant::{AssistantClient, AssistantError, RunStatus};
use crate::dispatch::{DispatchError, ToolContext, ToolDispatcher};
use crate::render::render_reply;
use crate::session::{Session, SessionRegistry};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Assistant(#[from] AssistantError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("run ended in status {status}")]
    RunFailed { status: String },

    #[error("run did not complete within {waited_secs}s")]
    Timeout { waited_secs: u64 },
}

/// A finished exchange: the rendered segments plus the thread id the
/// conversation lives in.
#[derive(Clone, Debug)]
pub struct AgentReply {
    pub segments: Vec<ReplySegment>,
    pub session_id: String,
}

pub struct RunOrchestrator {
    assistant: Arc<dyn AssistantClient>,
    dispatcher: ToolDispatcher,
    directory: CustomerDirectory,
    sessions: Arc<SessionRegistry>,
    poll_interval: Duration,
    run_timeout: Duration,
}

impl RunOrchestrator {
    pub fn new(
        assistant: Arc<dyn AssistantClient>,
        dispatcher: ToolDispatcher,
        directory: CustomerDirectory,
        sessions: Arc<SessionRegistry>,
        poll_interval: Duration,
        run_timeout: Duration,
    ) -> Self {
        Self { assistant, dispatcher, directory, sessions, poll_interval, run_timeout }
    }

    pub async fn handle_message(
        &self,
        identity: &str,
        text: &str,
    ) -> Result<AgentReply, OrchestratorError> {
        let correlation_id = Uuid::new_v4().to_string();
        let session = self.session_for(identity).await?;
        let context =
            ToolContext { phone: identity.to_string(), profile: session.profile.clone() };

        self.assistant.append_user_message(&session.thread_id, text).await?;
        let run_id = self
            .assistant
            .start_run(&session.thread_id, &crate::dispatch::tool_schema())
            .await?;
        info!(
            event_name = "run.started",
            correlation_id = %correlation_id,
            identity,
            thread_id = %session.thread_id,
            run_id = %run_id,
            session_age_secs = session.created_at.elapsed().as_secs()
        );

        let deadline = Instant::now() + self.run_timeout;
        loop {
            if Instant::now() >= deadline {
                return Err(OrchestratorError::Timeout {
                    waited_secs: self.run_timeout.as_secs(),
                });
            }

            let snapshot = self.assistant.run_snapshot(&session.thread_id, &run_id).await?;
            match snapshot.status {
                RunStatus::Completed => break,
                RunStatus::RequiresAction => {
                    info!(
                        event_name = "run.tool_batch.dispatched",
                        correlation_id = %correlation_id,
                        run_id = %run_id,
                        calls = snapshot.tool_calls.len()
                    );
                    let outputs =
                        self.dispatcher.dispatch_batch(&context, &snapshot.tool_calls).await?;
                    self.assistant
                        .submit_tool_outputs(&session.thread_id, &run_id, &outputs)
                        .await?;
                }
                status if status.is_terminal_failure() => {
                    return Err(OrchestratorError::RunFailed { status: status.to_string() });
                }
                // queued, in_progress or something newer; keep waiting.
                _ => {}
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        let reply = self.assistant.latest_reply(&session.thread_id).await?;
        let segments = render_reply(&reply);
        info!(
            event_name = "run.completed",
            correlation_id = %correlation_id,
            run_id = %run_id,
            segments = segments.len()
        );

        Ok(AgentReply { segments, session_id: session.thread_id })
    }

    /// Returns the live session for `identity`, opening a thread when there
    /// is none. On creation the customer profile is resolved once and, when
    /// found, fed to the thread as a synthetic note so the model knows who
    /// it is talking to and which prices apply.
    async fn session_for(&self, identity: &str) -> Result<Session, OrchestratorError> {
        if let Some(session) = self.sessions.get(identity).await {
            return Ok(session);
        }

        let profile = match self.directory.resolve(identity).await {
            Ok(profile) => profile,
            // A store fault must not block the conversation; the customer
            // just goes unrecognized until the next session.
            Err(error) => {
                warn!(event_name = "session.profile_lookup_failed", identity, error = %error);
                None
            }
        };

        let thread_id = self.assistant.create_thread().await?;
        let session = self
            .sessions
            .insert_if_absent(identity, Session::new(thread_id.clone(), profile))
            .await;

        // Only the task whose thread was kept seeds the note; a raced
        // duplicate thread is abandoned unseeded.
        if session.thread_id == thread_id {
            if let Some(profile) = &session.profile {
                self.assistant
                    .append_user_message(&session.thread_id, &profile_note(profile))
                    .await?;
            }
            info!(
                event_name = "session.created",
                identity,
                thread_id = %session.thread_id,
                recognized = session.profile.is_some()
            );
        }

        Ok(session)
    }
}

fn profile_note(profile: &CustomerProfile) -> String {
    format!(
        "Nota inicial: Este usuario se llama {} {} y sus apodo es {} y es cliente tipo {}. \
         Siempre muestra los precios correspondientes a su tipo de cliente.",
        profile.first_name, profile.last_name, profile.nickname, profile.tier_label
    )
}
