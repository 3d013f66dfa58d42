//! Generic translator service that works with any message adapter.

use crate::error::{Error, Result};
use crate::poller::{LogPoller, LogProbe};
use crate::publisher::Publish;
use crate::schema::{BuildRecord, Translation};
use crate::traits::{AdapterConfig, MessageAdapter};
use chrono::Utc;
use futures::StreamExt;
use metrics::counter;
use nats_client::{FailureWindow, InboundStream, NatsClient, RetryPolicy, StreamConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Tracing target for rejected messages. The binary routes it to its own
/// log file.
pub const BAD_MESSAGE_TARGET: &str = "bad_message";

/// Translates inbound payloads and routes the results.
///
/// Builds are published right away. Unittests are handed to a [`LogPoller`]
/// task each; those tasks live in a `JoinSet` owned by the dispatcher.
pub struct Dispatcher<A: MessageAdapter> {
    adapter: A,
    config: AdapterConfig,
    publisher: Arc<dyn Publish>,
    poller: LogPoller,
    polls: JoinSet<()>,
}

impl<A: MessageAdapter> Dispatcher<A> {
    pub fn new(
        adapter: A,
        config: AdapterConfig,
        publisher: Arc<dyn Publish>,
        probe: Arc<dyn LogProbe>,
    ) -> Self {
        let poller = LogPoller::new(probe, publisher.clone());
        Self::with_poller(adapter, config, publisher, poller)
    }

    pub fn with_poller(
        adapter: A,
        config: AdapterConfig,
        publisher: Arc<dyn Publish>,
        poller: LogPoller,
    ) -> Self {
        Self {
            adapter,
            config,
            publisher,
            poller,
            polls: JoinSet::new(),
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Handle one inbound message. Failures are logged and counted here;
    /// nothing propagates to the delivery loop.
    ///
    /// `bus_subject` may be empty when the payload carries its own routing key.
    pub async fn handle(&mut self, bus_subject: &str, payload: &[u8]) {
        counter!("translator_messages_received_total", "adapter" => A::NAME).increment(1);

        let routing_key = self.config.routing_key_for(bus_subject);
        if let Err(e) = self.process(&routing_key, payload).await {
            report_failure::<A>(&routing_key, payload, &e);
        }
    }

    /// Handle one inbound message unless a shutdown signal arrives first.
    ///
    /// Publishing retries while the bus is down, so a shutdown must be able
    /// to cut it short. Returns `false` when the shutdown won.
    pub async fn handle_until_shutdown(
        &mut self,
        bus_subject: &str,
        payload: &[u8],
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) -> bool {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                warn!("[{}] Shutdown while handling {}, message dropped", A::NAME, bus_subject);
                false
            }

            _ = self.handle(bus_subject, payload) => true,
        }
    }

    async fn process(&mut self, routing_key: &str, payload: &[u8]) -> Result<()> {
        let payload = std::str::from_utf8(payload)?;

        match self.adapter.translate(routing_key, payload)? {
            Translation::Ignored(reason) => {
                debug!("[{}] Ignoring {} ({})", A::NAME, routing_key, reason.as_str());
                counter!(
                    "translator_messages_ignored_total",
                    "adapter" => A::NAME,
                    "reason" => reason.as_str()
                )
                .increment(1);
            }
            Translation::Unittest(record) => self.enqueue_poll(*record),
            Translation::Builds(records) => {
                for record in records {
                    let subject = self.adapter.build_output_subject(&self.config, &record);
                    self.publisher.publish(&subject, &record).await?;
                }
            }
        }

        Ok(())
    }

    fn enqueue_poll(&mut self, mut record: BuildRecord) {
        record.insertion_time = Some(Utc::now().timestamp());
        let subject = self.adapter.build_output_subject(&self.config, &record);
        let poller = self.poller.clone();

        debug!("[{}] Waiting for log of {}", A::NAME, record.key);
        self.polls.spawn(async move {
            if let Err(e) = poller.poll(record, subject).await {
                if matches!(e, Error::LogTimeout { .. }) {
                    counter!("translator_log_timeouts_total", "adapter" => A::NAME).increment(1);
                }
                error!("[{}] {}", A::NAME, e);
            }
        });
    }

    /// Poll tasks not yet reaped, finished or not.
    pub fn pending_polls(&self) -> usize {
        self.polls.len()
    }

    /// Wait for the next poll task to finish.
    pub async fn reap_poll(&mut self) {
        if let Some(Err(e)) = self.polls.join_next().await {
            if e.is_panic() {
                error!("[{}] Log poll task panicked: {}", A::NAME, e);
            }
        }
    }

    /// Wait for every pending poll to finish.
    pub async fn drain(&mut self) {
        while !self.polls.is_empty() {
            self.reap_poll().await;
        }
    }

    /// Cancel every pending poll.
    pub fn abort_polls(&mut self) {
        if !self.polls.is_empty() {
            info!("[{}] Abandoning {} pending log polls", A::NAME, self.polls.len());
        }
        self.polls.abort_all();
    }
}

fn report_failure<A: MessageAdapter>(routing_key: &str, payload: &[u8], err: &Error) {
    let payload = String::from_utf8_lossy(payload);
    match err {
        Error::BadMessage(bad) => {
            warn!(
                target: BAD_MESSAGE_TARGET,
                "[{}] {}: {}\n{}",
                A::NAME,
                bad.kind(),
                bad,
                payload
            );
            counter!(
                "translator_bad_messages_total",
                "adapter" => A::NAME,
                "kind" => bad.kind()
            )
            .increment(1);
        }
        other => {
            error!(
                "[{}] Failed to process message {}: {}\n{}",
                A::NAME,
                routing_key,
                other,
                payload
            );
            counter!(
                "translator_errors_total",
                "adapter" => A::NAME,
                "error_type" => other.kind()
            )
            .increment(1);
        }
    }
}

/// Long-running translator bound to the bus.
pub struct TranslatorService<A: MessageAdapter> {
    dispatcher: Dispatcher<A>,
    nats_client: Arc<NatsClient>,
    durable: bool,
    reconnects: FailureWindow,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<A: MessageAdapter> TranslatorService<A> {
    pub fn new(
        dispatcher: Dispatcher<A>,
        nats_client: Arc<NatsClient>,
        durable: bool,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            dispatcher,
            nats_client,
            durable,
            reconnects: FailureWindow::new(RetryPolicy::default()),
            shutdown_rx,
        }
    }

    /// Run until a shutdown signal arrives.
    ///
    /// When the inbound subscription ends or cannot be opened, the service
    /// subscribes again after the failure-window delay.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let config = self.dispatcher.config().clone();
        info!(
            "Starting {} translator, subscribing to {}",
            A::NAME,
            config.filter_subject
        );

        // Ensure destination stream exists for persistence
        self.nats_client
            .ensure_stream_with_config(&StreamConfig::new(
                &config.dest_stream,
                format!("{}.>", config.output_subject_prefix),
            ))
            .await?;

        'connection: loop {
            match self.subscribe(&config).await {
                Ok(mut inbound) => {
                    info!("[{}] translator running", A::NAME);

                    loop {
                        tokio::select! {
                            biased;  // Prioritize shutdown signal

                            _ = self.shutdown_rx.recv() => {
                                info!("{} translator received shutdown signal", A::NAME);
                                break 'connection;
                            }

                            _ = self.dispatcher.reap_poll(), if self.dispatcher.pending_polls() > 0 => {}

                            msg = inbound.next() => {
                                match msg {
                                    Some(msg) => {
                                        if !self
                                            .dispatcher
                                            .handle_until_shutdown(&msg.subject, &msg.payload, &mut self.shutdown_rx)
                                            .await
                                        {
                                            break 'connection;
                                        }
                                    }
                                    None => {
                                        warn!("[{}] Subscription ended unexpectedly", A::NAME);
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("[{}] Failed to subscribe to {}: {:?}", A::NAME, config.filter_subject, e);
                }
            }

            counter!("translator_reconnects_total", "adapter" => A::NAME).increment(1);
            let delay = self.reconnects.record_failure(Instant::now());
            info!("[{}] Resubscribing in {:?}", A::NAME, delay);

            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("{} translator received shutdown signal", A::NAME);
                    break 'connection;
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.dispatcher.abort_polls();
        info!("{} translator service stopped", A::NAME);
        Ok(())
    }

    async fn subscribe(&self, config: &AdapterConfig) -> anyhow::Result<InboundStream> {
        if self.durable {
            let source = StreamConfig::new(&config.source_stream, &config.filter_subject);
            self.nats_client
                .subscribe_durable(&source, &config.filter_subject)
                .await
        } else {
            self.nats_client.subscribe(&config.filter_subject).await
        }
    }
}
