use crate::core::types::{ProjectionPhase, ProjectionPoint, ScenarioParameters};

pub fn project_scenario(params: &ScenarioParameters, start_year: i32) -> Vec<ProjectionPoint> {
    let horizon = params.life_expectancy.saturating_sub(params.current_age);
    let mut points = Vec::with_capacity(horizon as usize + 1);
    let mut net_worth = params.current_savings;
    for offset in 0..=horizon {
        let age = params.current_age + offset;
        let phase = if age >= params.retirement_age {
            ProjectionPhase::Retirement
        } else {
            ProjectionPhase::Accumulation
        };
        points.push(ProjectionPoint {
            age,
            year: start_year + offset as i32,
            net_worth,
            phase,
        });
        if offset < horizon {
            net_worth = step_year(params, age, net_worth);
        }
    }
    points
}

pub fn projected_retirement_portfolio(params: &ScenarioParameters) -> f64 {
    let mut net_worth = params.current_savings;
    for age in params.current_age..params.retirement_age {
        net_worth = step_year(params, age, net_worth);
    }
    net_worth
}

fn step_year(params: &ScenarioParameters, age: u32, net_worth: f64) -> f64 {
    let next = if age < params.retirement_age {
        (net_worth + params.annual_contribution) * (1.0 + params.expected_return_mean)
    } else {
        let years_retired = age - params.retirement_age;
        let expense =
            params.annual_expenses * (1.0 + params.inflation_rate).powi(years_retired as i32);
        (net_worth - expense) * (1.0 + params.expected_return_mean)
    };
    next.max(0.0)
}
