use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct GuardrailsConfig {
    pub initial_withdrawal_rate: f64,
    pub prosperity_guardband: f64,
    pub capital_preservation_guardband: f64,
    pub annual_adjustment_cap: f64,
    pub inflation_rate: f64,
}

pub const DEFAULT_GUARDRAILS: GuardrailsConfig = GuardrailsConfig {
    initial_withdrawal_rate: 0.04,
    prosperity_guardband: 0.20,
    capital_preservation_guardband: 0.20,
    annual_adjustment_cap: 0.10,
    inflation_rate: 0.03,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GuardrailsAdjustment {
    Increase,
    Decrease,
    InflationOnly,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailsState {
    pub year_index: u32,
    pub portfolio_value: f64,
    pub withdrawal: f64,
    pub withdrawal_rate: f64,
    pub baseline_withdrawal: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub adjustment: GuardrailsAdjustment,
}

// The increase branch requires BOTH its conditions while the decrease
// branch fires on EITHER of its conditions. The asymmetry is deliberate:
// raises are rationed, cuts are not.
pub fn next_withdrawal(
    portfolio_value: f64,
    previous_withdrawal: f64,
    initial_withdrawal: f64,
    years_since_retirement: u32,
    config: &GuardrailsConfig,
) -> GuardrailsState {
    let baseline = initial_withdrawal
        * (1.0 + config.inflation_rate).powi(years_since_retirement as i32);
    let upper_band = baseline * (1.0 + config.prosperity_guardband);
    let lower_band = baseline * (1.0 - config.capital_preservation_guardband);
    let current_rate = previous_withdrawal / portfolio_value.max(1e-9);
    let rate_ceiling = 1.5 * config.initial_withdrawal_rate;
    let cap = config.annual_adjustment_cap * previous_withdrawal;

    let (withdrawal, adjustment) =
        if previous_withdrawal < lower_band && current_rate < rate_ceiling {
            let raise = (lower_band - previous_withdrawal).min(cap);
            (previous_withdrawal + raise, GuardrailsAdjustment::Increase)
        } else if previous_withdrawal > upper_band || current_rate > rate_ceiling {
            let reduction = if previous_withdrawal > upper_band {
                (previous_withdrawal - upper_band).min(cap)
            } else {
                cap
            };
            (previous_withdrawal - reduction, GuardrailsAdjustment::Decrease)
        } else {
            (
                previous_withdrawal * (1.0 + config.inflation_rate),
                GuardrailsAdjustment::InflationOnly,
            )
        };

    GuardrailsState {
        year_index: years_since_retirement,
        portfolio_value,
        withdrawal,
        withdrawal_rate: withdrawal / portfolio_value.max(1e-9),
        baseline_withdrawal: baseline,
        upper_band,
        lower_band,
        adjustment,
    }
}
