use {crate::domain::money::MoneyAmount, chrono::Duration, std::env};

/// Platform-level knobs injected into the services. Loaded once at startup;
/// nothing in the core reads ambient globals.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Platform cut of each paid order, in basis points (3000 = 30%).
    pub platform_fee_bps: u32,
    /// Smallest net sum a creator may withdraw at once.
    pub min_withdrawal: MoneyAmount,
    /// How long income entries stay `pending` before becoming withdrawable.
    pub settlement_delay: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: 3000,
            min_withdrawal: MoneyAmount::new(10_000).expect("positive constant"),
            settlement_delay: Duration::zero(),
        }
    }
}

impl PlatformConfig {
    /// Environment overrides on top of the defaults. Unset vars keep the
    /// default; malformed values are rejected loudly at startup.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("PLATFORM_FEE_BPS") {
            cfg.platform_fee_bps = v.parse().expect("PLATFORM_FEE_BPS must be an integer");
            assert!(cfg.platform_fee_bps <= 10_000, "fee cannot exceed 100%");
        }
        if let Ok(v) = env::var("MIN_WITHDRAWAL_CENTS") {
            let cents: i64 = v.parse().expect("MIN_WITHDRAWAL_CENTS must be an integer");
            cfg.min_withdrawal = MoneyAmount::new(cents).expect("minimum cannot be negative");
        }
        if let Ok(v) = env::var("SETTLEMENT_DELAY_DAYS") {
            let days: i64 = v.parse().expect("SETTLEMENT_DELAY_DAYS must be an integer");
            cfg.settlement_delay = Duration::days(days);
        }
        cfg
    }
}
