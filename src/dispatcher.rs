//! State dispatcher
//!
//! The core of the daemon: decides whether a notification is a real
//! transition, updates the stored snapshot, and runs the hooks for the
//! resulting state. The dispatcher is the single writer of the
//! interface directory; the event loop awaits each dispatch to
//! completion before handing it the next event, so no locking is
//! needed around the read-compare-write of a record.

use crate::directory::InterfaceDirectory;
use crate::enrich::StatusEnricher;
use crate::environment::build_hook_env;
use crate::error::{LinkhookError, LinkhookResult};
use crate::hooks::{HookRunner, HookSelector};
use crate::state::{AdminState, OperState, StateAxis, StateTransitionEvent};
use tracing::{debug, error, info};

pub struct Dispatcher {
    directory: InterfaceDirectory,
    selector: HookSelector,
    runner: Box<dyn HookRunner>,
    enricher: Box<dyn StatusEnricher>,
}

impl Dispatcher {
    pub fn new(
        directory: InterfaceDirectory,
        selector: HookSelector,
        runner: Box<dyn HookRunner>,
        enricher: Box<dyn StatusEnricher>,
    ) -> Self {
        Self {
            directory,
            selector,
            runner,
            enricher,
        }
    }

    pub fn directory(&self) -> &InterfaceDirectory {
        &self.directory
    }

    /// Rebuild the interface directory from the link source
    pub async fn rebuild(&mut self) -> LinkhookResult<()> {
        self.directory.rebuild().await
    }

    /// Process one state-transition event.
    ///
    /// The two axes are handled administrative-then-operational,
    /// independently; a failure on one axis is logged and never
    /// prevents the other axis from being processed.
    pub async fn dispatch(&mut self, event: &StateTransitionEvent) {
        if let Err(e) = self.process_administrative(event).await {
            error!(
                "Failed to process {} transition for {}: {}",
                StateAxis::Administrative,
                event.iface,
                e
            );
        }
        if let Err(e) = self.process_operational(event).await {
            error!(
                "Failed to process {} transition for {}: {}",
                StateAxis::Operational,
                event.iface,
                e
            );
        }
    }

    async fn process_administrative(&mut self, event: &StateTransitionEvent) -> LinkhookResult<()> {
        let Some(new_state) = event.administrative_state else {
            return Ok(());
        };

        let record = self
            .directory
            .get(&event.iface)
            .ok_or_else(|| LinkhookError::UnknownInterface(event.iface.clone()))?;

        if record.administrative_state == Some(new_state) && !event.force {
            debug!(
                "{}: administrative state already {}, nothing to do",
                event.iface, new_state
            );
            return Ok(());
        }

        let updated = record.with_administrative(new_state);
        self.directory.put(updated);

        info!("{}: administrative state -> {}", event.iface, new_state);
        self.run_hooks(&event.iface, new_state.as_str()).await;
        Ok(())
    }

    async fn process_operational(&mut self, event: &StateTransitionEvent) -> LinkhookResult<()> {
        let Some(new_state) = event.operational_state else {
            return Ok(());
        };

        let record = self
            .directory
            .get(&event.iface)
            .ok_or_else(|| LinkhookError::UnknownInterface(event.iface.clone()))?;

        if record.operational_state == Some(new_state) && !event.force {
            debug!(
                "{}: operational state already {}, nothing to do",
                event.iface, new_state
            );
            return Ok(());
        }

        // The snapshot is updated even for ignored states so the next
        // transition is detected against the real current value.
        let updated = record.with_operational(new_state);
        self.directory.put(updated);

        if new_state.is_ignored() {
            debug!(
                "{}: operational state -> {} (intermediate, no hooks)",
                event.iface, new_state
            );
            return Ok(());
        }

        info!("{}: operational state -> {}", event.iface, new_state);
        self.run_hooks(&event.iface, new_state.as_str()).await;
        Ok(())
    }

    /// The hook-run procedure: enrich, build the environment, run the
    /// ordered hook list for the target state.
    async fn run_hooks(&mut self, iface: &str, state: &str) {
        let data = self.enricher.enrich(iface).await;

        let record = self.directory.get(iface);
        let env = build_hook_env(
            iface,
            state,
            record.and_then(|r| r.administrative_state),
            record.and_then(|r| r.operational_state),
            &data,
        );

        let hooks = match self.selector.select(state).await {
            Ok(hooks) => hooks,
            Err(e) => {
                error!("Failed to scan hooks for state {}: {}", state, e);
                return;
            }
        };
        if hooks.is_empty() {
            debug!("No hooks configured for state {}", state);
            return;
        }

        self.runner.run(&hooks, &env).await;
    }

    /// Handle a raw bus notification carrying a link index.
    ///
    /// An unrecognized index forces a directory rebuild before
    /// resolution, even if the payload is empty, in case the directory
    /// missed the link's appearance. An index that stays unresolved
    /// after the rebuild is a presumed transient race; the event is
    /// dropped.
    pub async fn handle_indexed_event(
        &mut self,
        index: u32,
        administrative_state: Option<AdminState>,
        operational_state: Option<OperState>,
    ) {
        if self.directory.resolve(index).is_none() {
            debug!("Unknown link index {}, rebuilding interface directory", index);
            if let Err(e) = self.directory.rebuild().await {
                error!("Failed to rebuild interface directory: {}", e);
            }
        }

        let Some(iface) = self.directory.resolve(index).map(str::to_string) else {
            error!("Dropping event for unresolvable link index {}", index);
            return;
        };

        let event = StateTransitionEvent {
            iface,
            administrative_state,
            operational_state,
            force: false,
        };
        self.dispatch(&event).await;
    }

    /// Startup reconciliation: re-dispatch every known interface's
    /// current state with force set, so hooks fire for links that
    /// settled before the daemon started.
    pub async fn trigger_all(&mut self) {
        let mut names = self.directory.names();
        names.sort();

        info!("Running startup triggers for {} interfaces", names.len());
        for name in names {
            let Some(record) = self.directory.get(&name) else {
                error!("Interface {} disappeared during reconciliation", name);
                continue;
            };

            let event = StateTransitionEvent {
                iface: name,
                administrative_state: record.administrative_state,
                operational_state: record.operational_state,
                force: true,
            };
            self.dispatch(&event).await;
        }
    }
}
