//! Materialized view of the enriched invoice collection.
//!
//! The view is computed lazily: the first `request()` spawns a driver task
//! that fetches the base collection through the shared fetch-once cache,
//! joins it against the customer source, and then folds every command from
//! the bus into the current collection in arrival order. The driver keeps
//! running whether or not anyone is subscribed, and every subscriber is
//! replayed the latest collection on subscription.

use crate::config::JoinPolicy;
use crate::core::command::{Command, CommandBus};
use crate::core::record::{EnrichedInvoice, Invoice, Snapshot};
use crate::customers::CustomerSource;
use crate::error::{Error, Result};
use crate::storage::fetch_once::FetchOnce;
use crate::storage::fold::ViewFolder;
use crate::storage::join::enrich;
use crate::stream::{Replay, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Value observed by view subscribers
pub type ViewState = Result<Snapshot<EnrichedInvoice>>;

struct ViewInner {
    invoices: Arc<FetchOnce<Invoice>>,
    customers: Arc<dyn CustomerSource>,
    policy: JoinPolicy,
    output: Replay<ViewState>,
    commands: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    running: AtomicBool,
}

/// Shared, lazily computed view of the current invoices
pub struct MaterializedView {
    inner: Arc<ViewInner>,
    bus: CommandBus,
}

impl MaterializedView {
    pub fn new(
        invoices: Arc<FetchOnce<Invoice>>,
        customers: Arc<dyn CustomerSource>,
        policy: JoinPolicy,
    ) -> Self {
        let (bus, commands) = CommandBus::channel();
        Self {
            inner: Arc::new(ViewInner {
                invoices,
                customers,
                policy,
                output: Replay::new(),
                commands: Mutex::new(Some(commands)),
                running: AtomicBool::new(false),
            }),
            bus,
        }
    }

    /// Subscribe to the view, starting its computation if it is not running.
    ///
    /// A failed base fetch is published as an `Err` and stops the driver; the
    /// next call withdraws that error and starts the driver again, so it
    /// retries the fetch.
    pub fn request(&self) -> Result<Subscription<ViewState>> {
        let subscription = self.inner.output.subscribe();
        self.start()?;
        Ok(subscription)
    }

    /// Subscribe without starting the computation
    pub fn subscribe(&self) -> Subscription<ViewState> {
        self.inner.output.subscribe()
    }

    /// Latest published state, if any
    pub fn latest(&self) -> Option<ViewState> {
        self.inner.output.latest()
    }

    /// Bus feeding this view. Commands sent before the view is seeded are
    /// applied, in order, right after seeding.
    pub fn commands(&self) -> &CommandBus {
        &self.bus
    }

    fn start(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.running.store(false, Ordering::Release);
                return Err(Error::Runtime(e.to_string()));
            }
        };
        let Some(commands) = self.inner.take_commands() else {
            self.inner.running.store(false, Ordering::Release);
            return Err(Error::Closed("view command stream already consumed".to_string()));
        };

        // A replayed error from a failed attempt must not reach subscribers
        // of this one.
        self.inner.output.clear();
        info!("starting materialized view");
        handle.spawn(drive(self.inner.clone(), commands));
        Ok(())
    }
}

impl ViewInner {
    fn lock_commands(&self) -> MutexGuard<'_, Option<mpsc::UnboundedReceiver<Command>>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_commands(&self) -> Option<mpsc::UnboundedReceiver<Command>> {
        self.lock_commands().take()
    }

    /// Hand the command stream back and allow a later restart
    fn park(&self, commands: mpsc::UnboundedReceiver<Command>) {
        *self.lock_commands() = Some(commands);
        self.running.store(false, Ordering::Release);
    }
}

async fn drive(inner: Arc<ViewInner>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let seeded = async {
        let mut customers = inner.customers.customers().await?;
        let invoices = inner.invoices.request().await?;
        let related = customers
            .next()
            .await
            .ok_or_else(|| Error::Closed("customer source ended before first value".to_string()))?;
        let records = enrich(&invoices, &related);
        Ok::<_, Error>((ViewFolder::seed(records, related, inner.policy), customers))
    }
    .await;

    let (mut folder, mut customers) = match seeded {
        Ok(seeded) => seeded,
        Err(e) => {
            warn!(error = %e, "materialized view seed failed");
            inner.output.publish(Err(e));
            inner.park(commands);
            return;
        }
    };

    let current = folder.current();
    info!(records = current.len(), "materialized view seeded");
    inner.output.publish(Ok(current));

    let mut customers_open = true;
    loop {
        tokio::select! {
            // Pending customer updates are taken first so an `Add` resolves
            // against the latest customers.
            biased;
            update = customers.next(), if customers_open => match update {
                Some(related) => {
                    if let Some(next) = folder.update_customers(related) {
                        debug!(records = next.len(), "view re-enriched");
                        inner.output.publish(Ok(next));
                    }
                }
                None => customers_open = false,
            },
            command = commands.recv() => {
                let Some(command) = command else { break };
                if let Some(next) = folder.apply(command) {
                    debug!(records = next.len(), "view updated");
                    inner.output.publish(Ok(next));
                }
            }
        }
    }
    debug!("command bus closed, materialized view driver stopped");
}
