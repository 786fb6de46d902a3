//! Inbound message pump.
//!
//! Connects the transport, reads messages one at a time, and walks each
//! through admission, the handler, and segment delivery. One message is
//! fully delivered before the next is read, so replies to a sender keep
//! their order. Exchange failures apologize to the sender instead of
//! crashing the pump; transport failures reconnect with backoff.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mostrador_core::domain::reply::ReplySegment;
use tracing::{debug, info, warn};

use crate::identity::{normalize_sender, SenderAllowList};
use crate::transport::{ChannelTransport, InboundMessage, ReconnectPolicy, TransportError};

const APOLOGY: &str = "Lo siento, hubo un error al procesar tu mensaje.";

/// What the runner calls with each admitted message. Implemented outside
/// this crate by whatever owns the conversation engine.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, identity: &str, text: &str) -> Result<Vec<ReplySegment>>;
}

pub struct ChannelRunner {
    transport: Arc<dyn ChannelTransport>,
    handler: Arc<dyn ChannelHandler>,
    allow_list: SenderAllowList,
    country_prefix: String,
    reconnect_policy: ReconnectPolicy,
}

impl ChannelRunner {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        handler: Arc<dyn ChannelHandler>,
        allow_list: SenderAllowList,
        country_prefix: impl Into<String>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            handler,
            allow_list,
            country_prefix: country_prefix.into(),
            reconnect_policy,
        }
    }

    /// Runs the pump until the stream closes cleanly. Transport failures
    /// are retried with backoff; exhausting the retries stops the channel
    /// without taking the process down.
    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "channel transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "channel retries exhausted; continuing process without the channel"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        self.transport.connect().await?;
        info!(attempt, event_name = "channel.connected", "channel transport connected");

        loop {
            let Some(message) = self.transport.next_message().await? else {
                info!(attempt, event_name = "channel.closed", "channel stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            self.process(message).await;
        }
    }

    async fn process(&self, message: InboundMessage) {
        let identity = normalize_sender(&message.sender, &self.country_prefix);

        if !self.allow_list.permits(&identity) {
            info!(event_name = "channel.sender_rejected", sender = %identity);
            return;
        }
        debug!(event_name = "channel.message_received", sender = %identity);

        match self.handler.handle(&identity, &message.text).await {
            Ok(segments) => self.deliver(&message.sender, segments).await,
            Err(error) => {
                warn!(event_name = "channel.exchange_failed", sender = %identity, error = %error);
                if let Err(send_error) =
                    self.transport.send_text(&message.sender, APOLOGY).await
                {
                    warn!(
                        event_name = "channel.apology_failed",
                        sender = %identity,
                        error = %send_error
                    );
                }
            }
        }
    }

    /// Sends segments in order. A failed image falls back to its URL as
    /// text; any other failed segment is logged and skipped so the rest of
    /// the reply still goes out.
    async fn deliver(&self, recipient: &str, segments: Vec<ReplySegment>) {
        for segment in segments {
            let outcome = match segment {
                ReplySegment::Text { content } => {
                    self.transport.send_text(recipient, &content).await
                }
                ReplySegment::Image { url, alt } => {
                    match self.transport.send_image(recipient, &url, &alt).await {
                        Ok(()) => Ok(()),
                        Err(error) => {
                            warn!(
                                event_name = "channel.image_send_failed",
                                url = %url,
                                error = %error
                            );
                            self.transport
                                .send_text(
                                    recipient,
                                    &format!("No se pudo enviar la imagen. URL: {url}"),
                                )
                                .await
                        }
                    }
                }
                ReplySegment::Opaque { .. } => continue,
            };

            if let Err(error) = outcome {
                warn!(event_name = "channel.segment_send_failed", recipient, error = %error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn admitted_messages_get_their_segments_in_order() {
        let transport = Arc::new(ScriptedTransport::with_messages(vec![InboundMessage {
            sender: "5491144445555@c.us".to_string(),
            text: "Hola".to_string(),
        }]));
        let handler = Arc::new(ScriptedHandler::replying(vec![
            ReplySegment::text("Tenemos estas botas:"),
            ReplySegment::image("http://localhost:3000/images/file_1", "Bota"),
            ReplySegment::text("Avisame cuál te gusta."),
        ]));

        runner(transport.clone(), handler.clone()).start().await.expect("pump");

        assert_eq!(handler.calls.lock().await.clone(), vec![(
            "1144445555".to_string(),
            "Hola".to_string()
        )]);
        assert_eq!(
            transport.sent.lock().await.clone(),
            vec![
                Sent::Text("5491144445555@c.us".to_string(), "Tenemos estas botas:".to_string()),
                Sent::Image(
                    "5491144445555@c.us".to_string(),
                    "http://localhost:3000/images/file_1".to_string(),
                    "Bota".to_string()
                ),
                Sent::Text(
                    "5491144445555@c.us".to_string(),
                    "Avisame cuál te gusta.".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn unauthorized_senders_are_dropped_silently() {
        let transport = Arc::new(ScriptedTransport::with_messages(vec![InboundMessage {
            sender: "5491199998888@c.us".to_string(),
            text: "Hola".to_string(),
        }]));
        let handler = Arc::new(ScriptedHandler::replying(vec![ReplySegment::text("no")]));

        runner(transport.clone(), handler.clone()).start().await.expect("pump");

        assert!(handler.calls.lock().await.is_empty());
        assert!(transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn a_failed_image_falls_back_to_its_url() {
        let transport = Arc::new(ScriptedTransport::with_messages(vec![InboundMessage {
            sender: "5491144445555@c.us".to_string(),
            text: "Mostrame".to_string(),
        }]));
        transport.fail_images();
        let handler = Arc::new(ScriptedHandler::replying(vec![ReplySegment::image(
            "http://localhost:3000/images/file_1",
            "Bota",
        )]));

        runner(transport.clone(), handler).start().await.expect("pump");

        assert_eq!(
            transport.sent.lock().await.clone(),
            vec![Sent::Text(
                "5491144445555@c.us".to_string(),
                "No se pudo enviar la imagen. URL: http://localhost:3000/images/file_1"
                    .to_string()
            )]
        );
    }

    #[tokio::test]
    async fn a_failed_exchange_apologizes_to_the_sender() {
        let transport = Arc::new(ScriptedTransport::with_messages(vec![InboundMessage {
            sender: "5491144445555@c.us".to_string(),
            text: "Hola".to_string(),
        }]));
        let handler = Arc::new(ScriptedHandler::failing());

        runner(transport.clone(), handler).start().await.expect("pump");

        assert_eq!(
            transport.sent.lock().await.clone(),
            vec![Sent::Text("5491144445555@c.us".to_string(), APOLOGY.to_string())]
        );
    }

    #[tokio::test]
    async fn opaque_segments_are_skipped() {
        let transport = Arc::new(ScriptedTransport::with_messages(vec![InboundMessage {
            sender: "5491144445555@c.us".to_string(),
            text: "Hola".to_string(),
        }]));
        let handler = Arc::new(ScriptedHandler::replying(vec![
            ReplySegment::Opaque { kind: "image_file".to_string(), content: None },
            ReplySegment::text("solo esto"),
        ]));

        runner(transport.clone(), handler).start().await.expect("pump");

        assert_eq!(
            transport.sent.lock().await.clone(),
            vec![Sent::Text("5491144445555@c.us".to_string(), "solo esto".to_string())]
        );
    }

    #[tokio::test]
    async fn connect_failures_retry_then_give_up_without_crashing() {
        let transport = Arc::new(ScriptedTransport::never_connecting());
        let handler = Arc::new(ScriptedHandler::replying(vec![]));

        let runner = ChannelRunner::new(
            transport.clone(),
            handler,
            SenderAllowList::new(["1144445555"]),
            "549",
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );
        runner.start().await.expect("retries exhaust quietly");

        assert_eq!(transport.connect_attempts.load(Ordering::SeqCst), 3);
    }

    fn runner(
        transport: Arc<ScriptedTransport>,
        handler: Arc<dyn ChannelHandler>,
    ) -> ChannelRunner {
        ChannelRunner::new(
            transport,
            handler,
            SenderAllowList::new(["1144445555"]),
            "549",
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        )
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Sent {
        Text(String, String),
        Image(String, String, String),
    }

    struct ScriptedTransport {
        inbox: Mutex<VecDeque<InboundMessage>>,
        sent: Mutex<Vec<Sent>>,
        connect_attempts: AtomicU32,
        refuse_connect: bool,
        images_fail: std::sync::atomic::AtomicBool,
    }

    impl ScriptedTransport {
        fn with_messages(messages: Vec<InboundMessage>) -> Self {
            Self {
                inbox: Mutex::new(VecDeque::from(messages)),
                sent: Mutex::new(Vec::new()),
                connect_attempts: AtomicU32::new(0),
                refuse_connect: false,
                images_fail: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn never_connecting() -> Self {
            Self { refuse_connect: true, ..Self::with_messages(vec![]) }
        }

        fn fail_images(&self) {
            self.images_fail.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ChannelTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            self.connect_attempts.fetch_add(1, Ordering::SeqCst);
            if self.refuse_connect {
                return Err(TransportError::Connect("bridge offline".to_string()));
            }
            Ok(())
        }

        async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
            Ok(self.inbox.lock().await.pop_front())
        }

        async fn send_text(&self, recipient: &str, text: &str) -> Result<(), TransportError> {
            self.sent
                .lock()
                .await
                .push(Sent::Text(recipient.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_image(
            &self,
            recipient: &str,
            url: &str,
            caption: &str,
        ) -> Result<(), TransportError> {
            if self.images_fail.load(Ordering::SeqCst) {
                return Err(TransportError::Send("media rejected".to_string()));
            }
            self.sent.lock().await.push(Sent::Image(
                recipient.to_string(),
                url.to_string(),
                caption.to_string(),
            ));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct ScriptedHandler {
        segments: Vec<ReplySegment>,
        fail: bool,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedHandler {
        fn replying(segments: Vec<ReplySegment>) -> Self {
            Self { segments, fail: false, calls: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { segments: vec![], fail: true, calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ChannelHandler for ScriptedHandler {
        async fn handle(&self, identity: &str, text: &str) -> Result<Vec<ReplySegment>> {
            self.calls.lock().await.push((identity.to_string(), text.to_string()));
            if self.fail {
                anyhow::bail!("exchange blew up");
            }
            Ok(self.segments.clone())
        }
    }
}
