//! Common types used throughout the ranked arena core

use crate::error::ArenaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for participants (user accounts)
pub type ParticipantId = String;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// Unique identifier for transaction audit rows
pub type TransactionId = Uuid;

/// Unique identifier for match history entries
pub type HistoryId = Uuid;

/// Virtual currencies a fee can be paid in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Gem,
    Coin,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Gem, Currency::Coin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Gem => "gem",
            Currency::Coin => "coin",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gem" => Ok(Currency::Gem),
            "coin" => Ok(Currency::Coin),
            other => Err(ArenaError::InvalidCurrency {
                value: other.to_string(),
            }),
        }
    }
}

/// Balance of one currency, split into total and earmarked amounts
///
/// `locked` never exceeds `balance`; every mutator refuses a change that would
/// break that, leaving the pair untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub balance: u64,
    pub locked: u64,
}

impl CurrencyBalance {
    pub fn new(balance: u64) -> Self {
        Self { balance, locked: 0 }
    }

    /// Amount free for spending or for a new reservation
    pub fn available(&self) -> u64 {
        self.balance.saturating_sub(self.locked)
    }

    /// Earmark `amount`; false if not enough is available
    pub fn lock(&mut self, amount: u64) -> bool {
        if self.available() < amount {
            return false;
        }
        self.locked += amount;
        true
    }

    /// Return `amount` of earmarked funds to available
    pub fn unlock(&mut self, amount: u64) -> bool {
        if self.locked < amount {
            return false;
        }
        self.locked -= amount;
        true
    }

    /// Debit `amount` out of the earmarked portion
    pub fn spend_locked(&mut self, amount: u64) -> bool {
        if self.locked < amount || self.balance < amount {
            return false;
        }
        self.balance -= amount;
        self.locked -= amount;
        true
    }

    pub fn credit(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }

    pub fn is_consistent(&self) -> bool {
        self.locked <= self.balance
    }
}

/// Both currency balances of a participant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub gem: CurrencyBalance,
    pub coin: CurrencyBalance,
}

impl Wallet {
    pub fn get(&self, currency: Currency) -> &CurrencyBalance {
        match currency {
            Currency::Gem => &self.gem,
            Currency::Coin => &self.coin,
        }
    }

    pub fn get_mut(&mut self, currency: Currency) -> &mut CurrencyBalance {
        match currency {
            Currency::Gem => &mut self.gem,
            Currency::Coin => &mut self.coin,
        }
    }
}

/// A user account as seen by the escrow and settlement core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub username: String,
    /// ELO rating
    pub rating: u32,
    /// Highest rank level reached; never decreases
    pub rank_level: u8,
    pub wallet: Wallet,
    pub wins: u32,
    pub losses: u32,
    pub total_matches: u32,
    /// Percentage with two decimals (60.0 means 60%)
    pub win_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            username: username.into(),
            rating: 0,
            rank_level: 1,
            wallet: Wallet::default(),
            wins: 0,
            losses: 0,
            total_matches: 0,
            win_rate: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_rating(mut self, rating: u32) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_rank_level(mut self, level: u8) -> Self {
        self.rank_level = level;
        self
    }

    pub fn with_balance(mut self, currency: Currency, balance: u64) -> Self {
        *self.wallet.get_mut(currency) = CurrencyBalance::new(balance);
        self
    }

    pub fn available(&self, currency: Currency) -> u64 {
        self.wallet.get(currency).available()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Whether a match counts for rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Ranked,
    Casual,
}

/// Lifecycle status of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Ongoing,
    Completed,
    Win,
    Lose,
    Draw,
}

impl MatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchStatus::Completed | MatchStatus::Win | MatchStatus::Lose | MatchStatus::Draw
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Ongoing => "ongoing",
            MatchStatus::Completed => "completed",
            MatchStatus::Win => "win",
            MatchStatus::Lose => "lose",
            MatchStatus::Draw => "draw",
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" | "pending" => Ok(MatchStatus::Waiting),
            "ongoing" => Ok(MatchStatus::Ongoing),
            "completed" => Ok(MatchStatus::Completed),
            "win" => Ok(MatchStatus::Win),
            "lose" => Ok(MatchStatus::Lose),
            "draw" => Ok(MatchStatus::Draw),
            other => Err(ArenaError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Declared result of a match, from the white participant's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOutcome {
    Win,
    Lose,
    Draw,
}

impl MatchOutcome {
    pub fn status(&self) -> MatchStatus {
        match self {
            MatchOutcome::Win => MatchStatus::Win,
            MatchOutcome::Lose => MatchStatus::Lose,
            MatchOutcome::Draw => MatchStatus::Draw,
        }
    }
}

impl FromStr for MatchOutcome {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win" => Ok(MatchOutcome::Win),
            "lose" => Ok(MatchOutcome::Lose),
            "draw" => Ok(MatchOutcome::Draw),
            other => Err(ArenaError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Ratings of both sides around a settlement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub white_before: Option<u32>,
    pub black_before: Option<u32>,
    pub white_after: Option<u32>,
    pub black_after: Option<u32>,
}

/// A pairing of two participants and its escrowed fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub white_id: ParticipantId,
    pub black_id: Option<ParticipantId>,
    pub kind: MatchKind,
    pub status: MatchStatus,
    pub fee: Option<u64>,
    pub currency: Option<Currency>,
    pub fee_reserved: bool,
    pub fee_committed: bool,
    pub winner_id: Option<ParticipantId>,
    pub ratings: RatingSnapshot,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn participants(&self) -> Vec<ParticipantId> {
        let mut ids = vec![self.white_id.clone()];
        if let Some(black) = &self.black_id {
            ids.push(black.clone());
        }
        ids
    }

    pub fn involves(&self, participant_id: &str) -> bool {
        self.white_id == participant_id || self.black_id.as_deref() == Some(participant_id)
    }

    /// Fee and currency, when the match carries an escrowed fee
    pub fn escrow(&self) -> Option<(u64, Currency)> {
        match (self.fee, self.currency) {
            (Some(fee), Some(currency)) => Some((fee, currency)),
            _ => None,
        }
    }
}

/// Kind of audit row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Fee earmarked for a ranked match
    RankMatchFee,
    /// Fee returned outside the reserve/release flow
    RankMatchRefund,
    /// Gems credited for reaching a new rank level
    PromotionReward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Append-only audit row for every balance movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub participant_id: ParticipantId,
    pub match_id: Option<MatchId>,
    pub kind: TransactionKind,
    pub amount: u64,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        participant_id: ParticipantId,
        match_id: Option<MatchId>,
        kind: TransactionKind,
        amount: u64,
        currency: Currency,
        status: TransactionStatus,
        description: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participant_id,
            match_id,
            kind,
            amount,
            currency,
            status,
            description,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending_reservation(&self, participant_id: &str, match_id: MatchId) -> bool {
        self.kind == TransactionKind::RankMatchFee
            && self.status == TransactionStatus::Pending
            && self.participant_id == participant_id
            && self.match_id == Some(match_id)
    }
}

/// Persisted snapshot of a reported game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistoryEntry {
    pub id: HistoryId,
    pub match_id: MatchId,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl MatchHistoryEntry {
    pub fn new(match_id: MatchId, content: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_id,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Available amount per currency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableBalances {
    pub gem: u64,
    pub coin: u64,
}

impl AvailableBalances {
    pub fn get(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Gem => self.gem,
            Currency::Coin => self.coin,
        }
    }
}

/// Result of a ranked eligibility check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub participant_id: ParticipantId,
    pub can_play: bool,
    pub required_fee: u64,
    pub available: AvailableBalances,
    pub tier: u8,
    pub rating: u32,
    /// Human-readable explanation, shown directly by the game client
    pub message: String,
}

impl Eligibility {
    /// Currencies that could pay the required fee right now
    pub fn payable_currencies(&self) -> Vec<Currency> {
        Currency::ALL
            .into_iter()
            .filter(|currency| self.available.get(*currency) >= self.required_fee)
            .collect()
    }
}

/// Outcome of a successful reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub participant_id: ParticipantId,
    pub match_id: MatchId,
    pub currency: Currency,
    pub fee: u64,
    pub locked_after: u64,
    pub transaction_id: TransactionId,
}

/// Outcome of a successful fee commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeCommit {
    pub participant_id: ParticipantId,
    pub match_id: MatchId,
    pub currency: Currency,
    pub fee: u64,
    pub remaining_balance: u64,
    /// True once every reservation of the match has been committed
    pub match_fee_committed: bool,
}

/// Outcome of a successful fee release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRelease {
    pub participant_id: ParticipantId,
    pub match_id: MatchId,
    pub currency: Currency,
    pub fee: u64,
    pub remaining_locked: u64,
}

/// Rating movement of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingChange {
    pub participant_id: ParticipantId,
    pub before: u32,
    pub after: u32,
    pub delta: i64,
}

impl RatingChange {
    pub fn new(participant_id: ParticipantId, before: u32, after: u32) -> Self {
        Self {
            participant_id,
            before,
            after,
            delta: i64::from(after) - i64::from(before),
        }
    }
}

/// Rank level gained during a settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub participant_id: ParticipantId,
    pub from_level: u8,
    pub to_level: u8,
    pub reward_gem: u64,
}

/// Everything a settlement changed, for the post-game screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub winner_id: Option<ParticipantId>,
    /// Empty for casual matches
    pub rating_changes: Vec<RatingChange>,
    pub promotions: Vec<Promotion>,
    pub history_id: HistoryId,
    pub completed_at: DateTime<Utc>,
}

/// Per-match fee projection for client polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeStatus {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub fee_reserved: bool,
    pub fee_committed: bool,
    pub fee: Option<u64>,
    pub currency: Option<Currency>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Newest first
    pub transactions: Vec<TransactionRecord>,
}

/// Recent audit rows of one participant, for the wallet screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionHistory {
    pub participant_id: ParticipantId,
    pub total_transactions: usize,
    pub transactions: Vec<TransactionRecord>,
}

/// Balance view of one currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub balance: u64,
    pub locked: u64,
    pub available: u64,
}

impl From<CurrencyBalance> for BalanceView {
    fn from(balance: CurrencyBalance) -> Self {
        Self {
            balance: balance.balance,
            locked: balance.locked,
            available: balance.available(),
        }
    }
}

/// Profile and balances of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub participant_id: ParticipantId,
    pub username: String,
    pub rating: u32,
    pub rank_level: u8,
    pub gem: BalanceView,
    pub coin: BalanceView,
    pub wins: u32,
    pub losses: u32,
    pub total_matches: u32,
    pub win_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Participant> for ParticipantProfile {
    fn from(participant: &Participant) -> Self {
        Self {
            participant_id: participant.id.clone(),
            username: participant.username.clone(),
            rating: participant.rating,
            rank_level: participant.rank_level,
            gem: participant.wallet.gem.into(),
            coin: participant.wallet.coin.into(),
            wins: participant.wins,
            losses: participant.losses,
            total_matches: participant.total_matches,
            win_rate: participant.win_rate,
            created_at: participant.created_at,
            updated_at: participant.updated_at,
        }
    }
}

/// A match together with every history entry saved for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistoryView {
    pub game: Match,
    pub entries: Vec<MatchHistoryEntry>,
}

/// Read-only view of in-flight reservations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservedMatchesInfo {
    pub total_reserved: usize,
    pub reserved_matches: Vec<MatchId>,
}
