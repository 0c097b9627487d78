//! Result model of the `profile_stats` request kind

use serde::{Deserialize, Serialize};

/// Aggregated statistics for the signed-in user
///
/// Every field is optional on the wire; missing values fall back to zeroes
/// so a partial row still renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileStats {
    pub messages: u64,
    pub voice_time: String,
    pub activity_seconds: String,
    pub total_balance: f64,
    pub bank_balance: f64,
    pub balance: f64,
    pub xp: u64,
    pub xp_now: u64,
    pub xp_need: u64,
    pub lvl: u32,
    pub user_name: String,
}

impl Default for ProfileStats {
    fn default() -> Self {
        Self {
            messages: 0,
            voice_time: "00:00".to_string(),
            activity_seconds: "00:00".to_string(),
            total_balance: 0.0,
            bank_balance: 0.0,
            balance: 0.0,
            xp: 0,
            xp_now: 0,
            xp_need: 0,
            lvl: 0,
            user_name: "Unknown Name".to_string(),
        }
    }
}

impl ProfileStats {
    /// Progress towards the next level, clamped to 0..=100
    pub fn xp_progress_percent(&self) -> f64 {
        if self.xp_need == 0 {
            return 0.0;
        }
        (self.xp_now as f64 / self.xp_need as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// `now/need (total) XP`
    pub fn xp_line(&self) -> String {
        format!("{}/{} ({}) XP", self.xp_now, self.xp_need, self.xp)
    }

    pub fn level_line(&self) -> String {
        format!("{} LvL", self.lvl)
    }

    pub fn total_balance_label(&self) -> String {
        format_money(self.total_balance)
    }

    pub fn bank_balance_label(&self) -> String {
        format_money(self.bank_balance)
    }

    pub fn cash_balance_label(&self) -> String {
        format_money(self.balance)
    }
}

/// Euro amount rounded to cents, without trailing zeroes
pub fn format_money(amount: f64) -> String {
    let rounded = (amount * 100.0).round() / 100.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("€{rounded}")
}
