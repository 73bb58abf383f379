//! Application context - wires the market to its data directory

use lendkit_core::{AccessControl, Caller, Clock, Principal, Role, RoleTable};
use lendkit_events::{EventRecord, EventStore, MarketEvent};
use lendkit_market::{Market, MarketConfig, MarketState};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONFIG_FILE: &str = "config.json";
const ROLES_FILE: &str = "roles.json";
const STATE_FILE: &str = "state.json";
const JOURNAL_DIR: &str = "journal";

pub struct AppContext {
    pub market: Market,
    roles: RoleTable,
    event_store: EventStore,
    clock: Arc<dyn Clock>,
    data_path: PathBuf,
}

impl AppContext {
    pub fn is_initialized(data_path: impl AsRef<Path>) -> bool {
        data_path.as_ref().join(STATE_FILE).exists()
    }

    /// Create a new market in an empty data directory
    ///
    /// `governor` receives the governor role so further grants are possible.
    pub fn init(
        data_path: impl AsRef<Path>,
        config: MarketConfig,
        governor: Principal,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, anyhow::Error> {
        let data_path = data_path.as_ref().to_path_buf();
        if Self::is_initialized(&data_path) {
            anyhow::bail!("Market already initialized in {}", data_path.display());
        }
        std::fs::create_dir_all(&data_path)?;

        let roles = RoleTable::new().with(governor.clone(), Role::Governor);
        let market = Market::new(config, Arc::new(roles.clone()), clock.clone())?;
        let event_store = EventStore::open(data_path.join(JOURNAL_DIR))?;

        let mut ctx = Self {
            market,
            roles,
            event_store,
            clock,
            data_path,
        };
        ctx.save_roles()?;
        ctx.commit()?;
        let now = ctx.clock.now();
        ctx.event_store.append(
            now,
            MarketEvent::RoleGranted {
                principal: governor,
                role: Role::Governor,
            },
        )?;
        Ok(ctx)
    }

    /// Load an initialized data directory
    pub fn open(data_path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, anyhow::Error> {
        let data_path = data_path.as_ref().to_path_buf();
        if !Self::is_initialized(&data_path) {
            anyhow::bail!(
                "No market in {} (run `lendkit init` first)",
                data_path.display()
            );
        }

        let config = MarketConfig::from_file(&data_path.join(CONFIG_FILE))?;
        let roles: RoleTable =
            serde_json::from_str(&std::fs::read_to_string(data_path.join(ROLES_FILE))?)?;
        let state = MarketState::from_file(&data_path.join(STATE_FILE))?;
        let market = Market::restore(config, state, Arc::new(roles.clone()), clock.clone())?;
        let event_store = EventStore::open(data_path.join(JOURNAL_DIR))?;

        Ok(Self {
            market,
            roles,
            event_store,
            clock,
            data_path,
        })
    }

    /// Persist state and config, then journal the queued events
    pub fn commit(&mut self) -> Result<Vec<EventRecord>, anyhow::Error> {
        self.market.config().to_file(&self.data_path.join(CONFIG_FILE))?;
        self.market
            .export_state()
            .to_file(&self.data_path.join(STATE_FILE))?;

        let mut records = Vec::new();
        for stamped in self.market.drain_events() {
            records.push(self.event_store.append(stamped.at, stamped.event)?);
        }
        Ok(records)
    }

    /// Grant a role (governor only); the market is rebuilt with the new table
    pub fn grant(&mut self, caller: &Caller, principal: Principal, role: Role) -> Result<(), anyhow::Error> {
        self.roles.require(caller, Role::Governor)?;
        self.commit()?;

        self.roles.grant(principal.clone(), role);
        self.save_roles()?;
        self.market = Market::restore(
            self.market.config().clone(),
            self.market.export_state(),
            Arc::new(self.roles.clone()),
            self.clock.clone(),
        )?;

        self.event_store
            .append(self.clock.now(), MarketEvent::RoleGranted { principal, role })?;
        Ok(())
    }

    fn save_roles(&self) -> Result<(), anyhow::Error> {
        std::fs::write(
            self.data_path.join(ROLES_FILE),
            serde_json::to_string_pretty(&self.roles)?,
        )?;
        Ok(())
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_path.join(JOURNAL_DIR)
    }

    pub fn last_sequence(&self) -> u64 {
        self.event_store.last_sequence()
    }
}
