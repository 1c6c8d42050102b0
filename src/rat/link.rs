//! Shared synchronization body of the RAT controllers.

use super::reply::ReplySchema;
use super::{SignalRoute, Technology};
use crate::adapters::CommandChannel;
use crate::error::AppResult;
use crate::sync::{CompletionGate, PollPolicy, StatePredicate, StateWatcher, Transition};
use std::sync::Arc;
use tracing::{debug, info};

/// Cell state once the signal is on and adjusted.
pub const OUTPUT_ON: &str = "ON,ADJ";

/// Cell state once the signal is off and adjusted.
pub const OUTPUT_OFF: &str = "OFF,ADJ";

/// Measurement state reply that ends the wait for a single-shot result.
///
/// The wait completes on the first state reply that is *not equal* to this code.
/// Note the inversion: a reply of exactly `RDY,ADJ,INV` keeps the wait going.
pub const MEASUREMENT_PENDING: &str = "RDY,ADJ,INV";

/// Connection established.
pub const CONNECTED: &str = "CEST";

/// Command vocabulary of one technology.
///
/// Every entry is an opaque SCPI string; the link only knows where to append
/// ` ON`, `?` or arguments.
#[derive(Debug)]
pub struct RatVocabulary {
    /// Technology this vocabulary drives
    pub technology: Technology,
    /// Signal route command (`ROUTe:<RAT>:SIGN:SCENario:SCELl`)
    pub route: &'static str,
    /// Cell state command, queried as `<cell_state>:ALL?`
    pub cell_state: &'static str,
    /// Connection state query
    pub connection_state: &'static str,
    /// Command asking the tester to connect the UE
    pub connect_action: &'static str,
    /// Single-shot measurement trigger
    pub measurement_start: &'static str,
    /// Measurement state query
    pub measurement_state: &'static str,
    /// Measurement result query
    pub measurement_result: &'static str,
    /// Layout of the measurement result reply
    pub measurement_schema: ReplySchema,
}

/// Route binding, output switching, connection gates and power measurement,
/// parameterized by a [`RatVocabulary`].
#[derive(Clone)]
pub struct RatLink {
    gate: CompletionGate,
    watcher: StateWatcher,
    vocabulary: &'static RatVocabulary,
    route: SignalRoute,
}

impl RatLink {
    /// Bind the technology's signal path to `route` and log the instrument's read-back.
    pub async fn bind(
        channel: Arc<dyn CommandChannel>,
        route: SignalRoute,
        policy: PollPolicy,
        vocabulary: &'static RatVocabulary,
    ) -> AppResult<Self> {
        let link = Self {
            gate: CompletionGate::rat_tester(channel.clone(), policy),
            watcher: StateWatcher::new(channel, policy),
            vocabulary,
            route,
        };
        link.gate
            .send(&format!("{} {}", vocabulary.route, link.route.scenario_args()))
            .await?;
        let applied = link.gate.query(&format!("{}?", vocabulary.route)).await?;
        debug!("{} route: {}", vocabulary.technology, applied.trim());
        Ok(link)
    }

    /// Completion gate of the radio tester.
    pub fn gate(&self) -> &CompletionGate {
        &self.gate
    }

    /// State watcher of the radio tester.
    pub fn watcher(&self) -> &StateWatcher {
        &self.watcher
    }

    /// Vocabulary this link speaks.
    pub fn vocabulary(&self) -> &'static RatVocabulary {
        self.vocabulary
    }

    /// Route bound at construction.
    pub fn route(&self) -> &SignalRoute {
        &self.route
    }

    /// Send a mutating command and wait for completion.
    pub async fn apply(&self, command: &str) -> AppResult<()> {
        self.gate.confirm_after(command).await
    }

    /// Send a command that needs no completion confirmation.
    pub async fn send(&self, command: &str) -> AppResult<()> {
        self.gate.send(command).await
    }

    /// Query the tester, trimming the reply.
    pub async fn read_back(&self, query: &str) -> AppResult<String> {
        Ok(self.gate.query(query).await?.trim().to_string())
    }

    fn cell_state_query(&self) -> String {
        format!("{}:ALL?", self.vocabulary.cell_state)
    }

    /// Switch the cell on unless it already reports `ON,ADJ`.
    pub async fn enable_output(&self) -> AppResult<Transition> {
        let on = StatePredicate::prefix(OUTPUT_ON);
        let transition = self
            .watcher
            .ensure_state(
                &self.cell_state_query(),
                &on,
                Some(&format!("{} ON", self.vocabulary.cell_state)),
                &on,
            )
            .await?;
        if let Transition::Reached(_) = transition {
            info!("{} output on", self.vocabulary.technology);
        }
        Ok(transition)
    }

    /// Switch the cell off and wait for `OFF,ADJ`.
    pub async fn disable_output(&self) -> AppResult<String> {
        let state = self
            .watcher
            .command_then_await(
                &format!("{} OFF", self.vocabulary.cell_state),
                &self.cell_state_query(),
                &StatePredicate::prefix(OUTPUT_OFF),
            )
            .await?;
        info!("{} output off", self.vocabulary.technology);
        Ok(state)
    }

    /// Passive connection gate: wait until the connection state starts with `target`.
    ///
    /// `already` may accept states beyond the target (GSM counts an established call
    /// as synchronized).
    pub async fn await_connection_state(
        &self,
        already: &StatePredicate,
        target: &'static str,
    ) -> AppResult<Transition> {
        let transition = self
            .watcher
            .ensure_state(
                self.vocabulary.connection_state,
                already,
                None,
                &StatePredicate::prefix(target),
            )
            .await?;
        if let Transition::Reached(_) = transition {
            info!("{} UE reached {}", self.vocabulary.technology, target);
        }
        Ok(transition)
    }

    /// Active connection gate: unless already connected, send the connect action and
    /// wait for `CEST`.
    pub async fn connect(&self) -> AppResult<Transition> {
        let connected = StatePredicate::prefix(CONNECTED);
        let transition = self
            .watcher
            .ensure_state(
                self.vocabulary.connection_state,
                &connected,
                Some(self.vocabulary.connect_action),
                &connected,
            )
            .await?;
        if let Transition::Reached(_) = transition {
            info!("{} connection established", self.vocabulary.technology);
        }
        Ok(transition)
    }

    /// Send `command` unconditionally and wait for `CEST`.
    pub async fn command_then_connected(&self, command: &str) -> AppResult<String> {
        self.watcher
            .command_then_await(
                command,
                self.vocabulary.connection_state,
                &StatePredicate::prefix(CONNECTED),
            )
            .await
    }

    /// Trigger one measurement and return the average transmit power in dBm.
    pub async fn measure_average_tx_power(&self) -> AppResult<f64> {
        let vocabulary = self.vocabulary;
        self.apply(vocabulary.measurement_start).await?;
        self.watcher
            .await_state(
                vocabulary.measurement_state,
                &StatePredicate::not_equal(MEASUREMENT_PENDING),
            )
            .await?;
        let reply = self.gate.query(vocabulary.measurement_result).await?;
        let power = vocabulary.measurement_schema.extract_power(&reply)?;
        info!("{} tx power: {}dBm", vocabulary.technology, power);
        Ok(power)
    }
}
