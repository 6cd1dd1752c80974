mod chart_scenarios;
mod sandbox_scenarios;
