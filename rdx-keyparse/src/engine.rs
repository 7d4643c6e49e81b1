//! The async loop that connects an event source to the scheduler.

use crate::components::layout::Layout;
use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::SourceFault;
use crate::events::{EngineEvent, KeyEvent};
use crate::scheduler::{CycleReport, Scheduler};
use crate::source::EventSource;
use tokio::sync::broadcast;
use tracing::{error, info, trace};

/// The main keyparse engine.
///
/// Owns the scheduler (and through it the layout, the live generation and the
/// dispatcher) and drives it from one [`EventSource`]. Observers subscribe to
/// the `EngineEvent` stream; nothing outside the engine touches the scheduler
/// while it runs.
pub struct KeyparseEngine<D> {
    scheduler: Scheduler<D>,
    engine_event_sender: broadcast::Sender<EngineEvent>,
    shutdown_sender: broadcast::Sender<()>,
}

impl<D: Dispatcher> KeyparseEngine<D> {
    /// Creates a new engine for `layout`, dispatching through `dispatcher`.
    pub fn new(layout: Layout, dispatcher: D, config: &EngineConfig) -> Self {
        let (engine_event_sender, _) = broadcast::channel(config.channel_capacity.max(1));
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            scheduler: Scheduler::with_config(layout, dispatcher, config),
            engine_event_sender,
            shutdown_sender,
        }
    }

    /// Runs until the source faults or a shutdown signal is received.
    ///
    /// Each event goes through a full scheduler cycle before the next one is
    /// awaited. A `SourceFault` is the single fatal path: it is broadcast,
    /// then returned to the caller.
    pub async fn run<S: EventSource>(&mut self, mut source: S) -> Result<(), SourceFault> {
        info!("KeyparseEngine starting up...");
        let mut shutdown_rx = self.shutdown_sender.subscribe();
        self.engine_event_sender
            .send(EngineEvent::EngineStarted {
                timestamp: tokio::time::Instant::now(),
            })
            .ok();

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received.");
                    break Ok(());
                }
                next = source.next_event() => match next {
                    Ok(event) => {
                        self.process(&event);
                    }
                    Err(fault) => {
                        error!("Event source failed: {}", fault);
                        self.engine_event_sender
                            .send(EngineEvent::SourceFaulted { reason: fault.to_string() })
                            .ok();
                        break Err(fault);
                    }
                },
            }
        };

        self.engine_event_sender
            .send(EngineEvent::EngineShutdown)
            .ok();
        info!("KeyparseEngine has shut down.");
        result
    }

    /// Delivers one event synchronously and broadcasts what happened.
    pub fn process(&mut self, event: &KeyEvent) -> CycleReport {
        trace!(code = event.code, value = event.value, "Event received.");
        let report = self.scheduler.deliver(event);
        for fired in &report.fired {
            self.engine_event_sender
                .send(EngineEvent::RuleFired {
                    fired: fired.clone(),
                    at: event.timestamp,
                })
                .ok();
        }
        self.engine_event_sender
            .send(EngineEvent::CycleCompleted {
                live: report.live,
                completed: report.completed,
                failed: report.failed,
            })
            .ok();
        report
    }

    /// A sender that stops [`run`](Self::run) when anything is sent on it.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_sender.clone()
    }

    /// Subscribes to the `EngineEvent` stream.
    pub fn subscribe_engine_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.engine_event_sender.subscribe()
    }

    pub fn scheduler(&self) -> &Scheduler<D> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<D> {
        &mut self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::KeyCode;
    use crate::dispatch::{Action, Fired, RecordingDispatcher};
    use crate::source::ChannelSource;

    #[tokio::test]
    async fn closed_source_is_a_fault() {
        let mut engine = KeyparseEngine::new(
            Layout::caps2esc(),
            RecordingDispatcher::new(),
            &EngineConfig::default(),
        );
        let mut events = engine.subscribe_engine_events();
        let (sender, source) = ChannelSource::new(8);
        sender.send(KeyEvent::down(KeyCode::CAPSLOCK)).await.unwrap();
        sender.send(KeyEvent::up(KeyCode::CAPSLOCK)).await.unwrap();
        drop(sender);

        let result = engine.run(source).await;
        assert!(matches!(result, Err(SourceFault::Closed)));
        assert_eq!(
            engine.scheduler().dispatcher().fired,
            vec![Fired::new("caps2esc", Action::Tap(KeyCode::ESC))]
        );

        let mut saw_fired = false;
        let mut saw_fault = false;
        while let Ok(event) = events.try_recv() {
            match event {
                EngineEvent::RuleFired { fired, .. } => saw_fired = fired.rule == "caps2esc",
                EngineEvent::SourceFaulted { .. } => saw_fault = true,
                _ => {}
            }
        }
        assert!(saw_fired);
        assert!(saw_fault);
    }

    #[tokio::test]
    async fn shutdown_stops_a_quiet_engine() {
        let mut engine = KeyparseEngine::new(
            Layout::caps2esc(),
            RecordingDispatcher::new(),
            &EngineConfig::default(),
        );
        let shutdown = engine.shutdown_handle();
        let (_sender, source) = ChannelSource::new(8);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            shutdown.send(()).ok();
        });
        assert!(engine.run(source).await.is_ok());
        stopper.await.unwrap();
    }
}
