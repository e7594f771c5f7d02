use cosmwasm_std::Uint128;
use meropools_commitment::OrderParams;
use meropools_types::{OrderCommitment, OrderStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════
// STATES
// ═══════════════════════════════════════════════════════════════════════════

/// Step of the order lifecycle a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStep {
    Deposit,
    Identity,
    Join,
    SubmitPrivate,
    SubmitPool,
    Cancel,
    Settlement,
}

impl LifecycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStep::Deposit => "deposit",
            LifecycleStep::Identity => "identity",
            LifecycleStep::Join => "join",
            LifecycleStep::SubmitPrivate => "submit_private",
            LifecycleStep::SubmitPool => "submit_pool",
            LifecycleStep::Cancel => "cancel",
            LifecycleStep::Settlement => "settlement",
        }
    }
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Draft,
    /// Deposit broadcast, confirmation outstanding
    DepositSubmitted,
    DepositConfirmed,
    IdentityProvisioned,
    ContextJoined,
    SubmittedPrivate,
    SubmittedPool,
    Active,
    PartiallyMatched,
    FullyMatched,
    Cancelled,
    Expired,
    SettlementPending,
    Settled,
    Failed { step: LifecycleStep, reason: String },
}

impl LifecycleState {
    /// No further transitions happen from here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Cancelled
                | LifecycleState::Expired
                | LifecycleState::Settled
                | LifecycleState::Failed { .. }
        )
    }

    /// Placed in the pool and not yet tied to a batch.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            LifecycleState::Active
                | LifecycleState::PartiallyMatched
                | LifecycleState::FullyMatched
        )
    }

    /// Still before `Active`; `drive` has work to do.
    pub fn is_placing(&self) -> bool {
        matches!(
            self,
            LifecycleState::Draft
                | LifecycleState::DepositSubmitted
                | LifecycleState::DepositConfirmed
                | LifecycleState::IdentityProvisioned
                | LifecycleState::ContextJoined
                | LifecycleState::SubmittedPrivate
                | LifecycleState::SubmittedPool
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Draft => "Draft",
            LifecycleState::DepositSubmitted => "DepositSubmitted",
            LifecycleState::DepositConfirmed => "DepositConfirmed",
            LifecycleState::IdentityProvisioned => "IdentityProvisioned",
            LifecycleState::ContextJoined => "ContextJoined",
            LifecycleState::SubmittedPrivate => "SubmittedPrivate",
            LifecycleState::SubmittedPool => "SubmittedPool",
            LifecycleState::Active => "Active",
            LifecycleState::PartiallyMatched => "PartiallyMatched",
            LifecycleState::FullyMatched => "FullyMatched",
            LifecycleState::Cancelled => "Cancelled",
            LifecycleState::Expired => "Expired",
            LifecycleState::SettlementPending => "SettlementPending",
            LifecycleState::Settled => "Settled",
            LifecycleState::Failed { .. } => "Failed",
        }
    }

    /// State implied by an engine-reported order status, if it moves the
    /// lifecycle at all.
    pub fn from_engine_status(status: &OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Active => None,
            OrderStatus::PartiallyMatched { .. } => Some(LifecycleState::PartiallyMatched),
            OrderStatus::FullyMatched => Some(LifecycleState::FullyMatched),
            OrderStatus::Cancelled => Some(LifecycleState::Cancelled),
            OrderStatus::Expired => Some(LifecycleState::Expired),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            LifecycleState::Active => 0,
            LifecycleState::PartiallyMatched => 1,
            LifecycleState::FullyMatched => 2,
            LifecycleState::Cancelled | LifecycleState::Expired => 3,
            LifecycleState::SettlementPending => 3,
            LifecycleState::Settled => 4,
            _ => 0,
        }
    }

    /// Forward-only progress among the post-placement states.
    pub fn advances_to(&self, next: &LifecycleState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Failed { step, reason } => write!(f, "Failed({step}: {reason})"),
            other => f.write_str(other.name()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ORDER INPUT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceMode {
    #[default]
    Market,
    /// `expected_price` is the trader's limit and must be positive
    Custom,
}

/// What a trader asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub params: OrderParams,
    #[serde(default)]
    pub price_mode: PriceMode,
}

impl OrderRequest {
    pub fn market(params: OrderParams) -> Self {
        Self {
            params,
            price_mode: PriceMode::Market,
        }
    }

    pub fn custom(params: OrderParams) -> Self {
        Self {
            params,
            price_mode: PriceMode::Custom,
        }
    }

    pub fn amount(&self) -> Uint128 {
        self.params.amount
    }
}

/// The trader behind a lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trader {
    /// Connected wallet on the settlement chain
    pub settlement_address: String,
    /// Identity already joined to the pool context, if any
    #[serde(default)]
    pub pool_identity: Option<String>,
}

impl Trader {
    pub fn new(settlement_address: impl Into<String>) -> Self {
        Self {
            settlement_address: settlement_address.into(),
            pool_identity: None,
        }
    }

    pub fn with_pool_identity(mut self, identity: impl Into<String>) -> Self {
        self.pool_identity = Some(identity.into());
        self
    }
}

/// Pre-submission order: terms plus the commitment built for them once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub request: OrderRequest,
    pub commitment: OrderCommitment,
}

// ═══════════════════════════════════════════════════════════════════════════
// DURABLE RECORD
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub at: u64,
}

/// Everything needed to resume an order from its last durable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLifecycle {
    pub lifecycle_id: String,
    pub trader: Trader,
    pub draft: OrderDraft,
    pub state: LifecycleState,
    pub deposit_tx: Option<String>,
    pub pool_identity: Option<String>,
    pub invitation: Option<String>,
    pub order_id: Option<String>,
    pub private_order_id: Option<String>,
    pub batch_id: Option<String>,
    pub settlement_tx: Option<String>,
    /// Submission started but its result was never recorded
    #[serde(default)]
    pub submitting: Option<LifecycleStep>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub history: Vec<LifecycleTransition>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl OrderLifecycle {
    pub fn new(
        lifecycle_id: impl Into<String>,
        trader: Trader,
        draft: OrderDraft,
        now: u64,
    ) -> Self {
        let pool_identity = trader.pool_identity.clone();
        Self {
            lifecycle_id: lifecycle_id.into(),
            trader,
            draft,
            state: LifecycleState::Draft,
            deposit_tx: None,
            pool_identity,
            invitation: None,
            order_id: None,
            private_order_id: None,
            batch_id: None,
            settlement_tx: None,
            submitting: None,
            warnings: Vec::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, appending to the history.
    pub fn transition(&mut self, next: LifecycleState, now: u64) {
        self.history.push(LifecycleTransition {
            from: self.state.clone(),
            to: next.clone(),
            at: now,
        });
        self.state = next;
        self.updated_at = now;
    }

    pub fn fail(&mut self, step: LifecycleStep, reason: impl Into<String>, now: u64) {
        self.transition(
            LifecycleState::Failed {
                step,
                reason: reason.into(),
            },
            now,
        );
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn commitment_hash(&self) -> [u8; 32] {
        self.draft.commitment.commitment_hash
    }
}
