pub mod events;
pub mod services;

pub use events::{create_event_bus, Event, EventBus, EventSubscriber, SharedEventBus};
pub use services::{
    CallbackAck, CostCalculator, OrderRegistry, RateTable, ReconciliationEngine, SessionService,
    SettlementOutcome, SettlementService, SweepWorker, WalletLedger,
};
