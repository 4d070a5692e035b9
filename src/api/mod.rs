use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    Commitment, ContributionPlan, DepositReceipt, IntensityTier, ProjectionSummary,
    SchedulePeriod, SimulationParameters, Snapshot, resolve_periodic_amount, run_simulation,
    schedule_warnings, summarize,
};

const MAX_HORIZON_YEARS: f64 = 100.0;
const MAX_APY_PERCENT: f64 = 1_000.0;
const MAX_PARTICIPANTS: u32 = 100_000;

// Used whenever the market feed has not supplied a value.
const DEFAULT_STRAND1_APY: f64 = 4.5;
const DEFAULT_STRAND2_APY: f64 = 8.0;
const DEFAULT_STRAND3_APY: f64 = 12.0;
const DEFAULT_REFERENCE_PRICE: f64 = 60_000.0;

const DEFAULT_HORIZON_YEARS: f64 = 10.0;
const DEFAULT_TIER: &str = "medium";
const DEFAULT_PARTICIPANTS: u32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "strands",
    about = "Group savings projection across three yield strands and a terminal store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the projection API over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Print a projection as JSON
    Project(ProjectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, default_value_t = DEFAULT_HORIZON_YEARS, help = "Projection horizon in years")]
    horizon_years: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_STRAND1_APY,
        help = "Annual yield of strand 1 in percent"
    )]
    strand1_apy: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_STRAND2_APY,
        help = "Annual yield of strand 2 in percent"
    )]
    strand2_apy: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_STRAND3_APY,
        help = "Annual yield of strand 3 in percent"
    )]
    strand3_apy: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_REFERENCE_PRICE,
        help = "Price of one unit of the terminal asset"
    )]
    reference_price: f64,
    #[arg(
        long,
        default_value = DEFAULT_TIER,
        help = "Contribution tier: low, medium, high or custom"
    )]
    tier: String,
    #[arg(
        long,
        help = "Custom schedule as start-end:amount items, e.g. 1-3:75,4-10:120"
    )]
    schedule: Option<String>,
    #[arg(
        long,
        help = "Weekly amount for custom years not covered by the schedule"
    )]
    custom_amount: Option<f64>,
    #[arg(long, default_value_t = DEFAULT_PARTICIPANTS, help = "Number of group members")]
    participants: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScheduleInput {
    Text(String),
    Periods(Vec<SchedulePeriod>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    horizon_years: Option<f64>,
    strand1_apy: Option<f64>,
    strand2_apy: Option<f64>,
    strand3_apy: Option<f64>,
    reference_price: Option<f64>,
    tier: Option<String>,
    schedule: Option<ScheduleInput>,
    custom_amount: Option<f64>,
    participants: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContributionQuery {
    tier: Option<String>,
    elapsed_years: Option<f64>,
    /// RFC 3339 creation time of a live commitment; the age is measured from it.
    created_at: Option<DateTime<Utc>>,
    schedule: Option<String>,
    custom_amount: Option<f64>,
    participants: Option<u32>,
}

#[derive(Debug)]
struct ApiRequest {
    params: SimulationParameters,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    tier: Option<IntensityTier>,
    horizon_years: f64,
    participants: u32,
    snapshots: Vec<Snapshot>,
    summary: ProjectionSummary,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContributionResponse {
    tier: Option<IntensityTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    elapsed_years: f64,
    weekly_amount: f64,
    /// How the amount due would be credited across the strands right now.
    #[serde(skip_serializing_if = "Option::is_none")]
    live_split: Option<DepositReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weekly_overhead: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn parse_schedule(text: &str) -> Result<Vec<SchedulePeriod>, String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| -> Result<SchedulePeriod, String> {
            let (years, amount) = item
                .split_once(':')
                .ok_or_else(|| format!("--schedule item '{item}' must look like start-end:amount"))?;
            let (start, end) = years
                .split_once('-')
                .ok_or_else(|| format!("--schedule item '{item}' must look like start-end:amount"))?;
            Ok(SchedulePeriod {
                start_year: start
                    .trim()
                    .parse()
                    .map_err(|_| format!("--schedule item '{item}' has an invalid start year"))?,
                end_year: end
                    .trim()
                    .parse()
                    .map_err(|_| format!("--schedule item '{item}' has an invalid end year"))?,
                amount: amount
                    .trim()
                    .parse()
                    .map_err(|_| format!("--schedule item '{item}' has an invalid amount"))?,
            })
        })
        .collect()
}

fn validate_schedule(schedule: &[SchedulePeriod]) -> Result<(), String> {
    for (index, period) in schedule.iter().enumerate() {
        if period.start_year < 1 {
            return Err(format!("--schedule period #{index} must start at year >= 1"));
        }
        if period.end_year < period.start_year {
            return Err(format!(
                "--schedule period #{index} must end at or after its start year"
            ));
        }
        if !period.amount.is_finite() || period.amount <= 0.0 {
            return Err(format!("--schedule period #{index} amount must be > 0"));
        }
    }
    Ok(())
}

fn build_plan(
    tier_name: &str,
    schedule: Vec<SchedulePeriod>,
    custom_amount: Option<f64>,
) -> Result<(ContributionPlan, Vec<String>), String> {
    if let Some(amount) = custom_amount {
        if !amount.is_finite() || amount < 0.0 {
            return Err("--custom-amount must be >= 0".to_string());
        }
    }
    validate_schedule(&schedule)?;

    let mut warnings = Vec::new();
    let tier = IntensityTier::from_name(tier_name);
    if tier.is_none() {
        warnings.push(format!(
            "unrecognized tier '{tier_name}'; no contributions are due"
        ));
    }
    if tier == Some(IntensityTier::Custom) {
        warnings.extend(schedule_warnings(&schedule).iter().map(|w| w.to_string()));
    }

    Ok((
        ContributionPlan {
            tier,
            schedule,
            custom_default: custom_amount,
        },
        warnings,
    ))
}

fn build_params(args: ProjectArgs) -> Result<ApiRequest, String> {
    if !args.horizon_years.is_finite()
        || !(0.0..=MAX_HORIZON_YEARS).contains(&args.horizon_years)
    {
        return Err(format!(
            "--horizon-years must be between 0 and {MAX_HORIZON_YEARS}"
        ));
    }

    for (name, apy) in [
        ("--strand1-apy", args.strand1_apy),
        ("--strand2-apy", args.strand2_apy),
        ("--strand3-apy", args.strand3_apy),
    ] {
        if !apy.is_finite() || !(0.0..=MAX_APY_PERCENT).contains(&apy) {
            return Err(format!("{name} must be between 0 and {MAX_APY_PERCENT}"));
        }
    }

    if !args.reference_price.is_finite() || args.reference_price < 0.0 {
        return Err("--reference-price must be >= 0".to_string());
    }

    if args.participants > MAX_PARTICIPANTS {
        return Err(format!("--participants must be <= {MAX_PARTICIPANTS}"));
    }

    let schedule = match args.schedule.as_deref() {
        Some(text) => parse_schedule(text)?,
        None => Vec::new(),
    };
    let (plan, warnings) = build_plan(&args.tier, schedule, args.custom_amount)?;

    Ok(ApiRequest {
        params: SimulationParameters {
            horizon_years: args.horizon_years,
            strand1_apy: args.strand1_apy,
            strand2_apy: args.strand2_apy,
            strand3_apy: args.strand3_apy,
            reference_price: args.reference_price,
            plan,
            participants: args.participants,
        },
        warnings,
    })
}

fn default_args_for_api() -> ProjectArgs {
    ProjectArgs {
        horizon_years: DEFAULT_HORIZON_YEARS,
        strand1_apy: DEFAULT_STRAND1_APY,
        strand2_apy: DEFAULT_STRAND2_APY,
        strand3_apy: DEFAULT_STRAND3_APY,
        reference_price: DEFAULT_REFERENCE_PRICE,
        tier: DEFAULT_TIER.to_string(),
        schedule: None,
        custom_amount: None,
        participants: DEFAULT_PARTICIPANTS,
    }
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut args = default_args_for_api();
    let mut periods = None;

    if let Some(v) = payload.horizon_years {
        args.horizon_years = v;
    }
    if let Some(v) = payload.strand1_apy {
        args.strand1_apy = v;
    }
    if let Some(v) = payload.strand2_apy {
        args.strand2_apy = v;
    }
    if let Some(v) = payload.strand3_apy {
        args.strand3_apy = v;
    }
    if let Some(v) = payload.reference_price {
        args.reference_price = v;
    }
    if let Some(v) = payload.tier {
        args.tier = v;
    }
    match payload.schedule {
        Some(ScheduleInput::Text(text)) => args.schedule = Some(text),
        Some(ScheduleInput::Periods(list)) => periods = Some(list),
        None => {}
    }
    if let Some(v) = payload.custom_amount {
        args.custom_amount = Some(v);
    }
    if let Some(v) = payload.participants {
        args.participants = v;
    }

    let tier_name = args.tier.clone();
    let mut request = build_params(args)?;
    if let Some(list) = periods {
        let (plan, warnings) =
            build_plan(&tier_name, list, request.params.plan.custom_default)?;
        request.params.plan = plan;
        request.warnings = warnings;
    }
    Ok(request)
}

fn build_simulate_response(request: &ApiRequest) -> SimulateResponse {
    let params = &request.params;
    let snapshots = run_simulation(params);
    let summary = summarize(&snapshots, params.reference_price);
    SimulateResponse {
        tier: params.plan.tier,
        horizon_years: params.horizon_years,
        participants: params.participants,
        snapshots,
        summary,
        warnings: request.warnings.clone(),
    }
}

fn contribution_response(
    query: ContributionQuery,
    now: DateTime<Utc>,
) -> Result<ContributionResponse, String> {
    let schedule = match query.schedule.as_deref() {
        Some(text) => parse_schedule(text)?,
        None => Vec::new(),
    };
    let tier_name = query.tier.unwrap_or_else(|| DEFAULT_TIER.to_string());
    let (plan, _) = build_plan(&tier_name, schedule, query.custom_amount)?;

    let Some(created_at) = query.created_at else {
        let elapsed_years = query.elapsed_years.unwrap_or(0.0);
        if !elapsed_years.is_finite() || elapsed_years < 0.0 {
            return Err("elapsedYears must be >= 0".to_string());
        }
        return Ok(ContributionResponse {
            tier: plan.tier,
            created_at: None,
            elapsed_years,
            weekly_amount: resolve_periodic_amount(
                plan.tier,
                elapsed_years,
                &plan.schedule,
                plan.custom_default,
            ),
            live_split: None,
            weekly_overhead: None,
        });
    };

    if query.elapsed_years.is_some() {
        return Err("Provide either elapsedYears or createdAt, not both".to_string());
    }
    let participants = query.participants.unwrap_or(DEFAULT_PARTICIPANTS);
    if participants > MAX_PARTICIPANTS {
        return Err(format!("participants must be <= {MAX_PARTICIPANTS}"));
    }

    let mut commitment = Commitment::new(created_at, plan, participants);
    let elapsed_years = commitment.elapsed_years(now).map_err(|e| e.to_string())?;
    let weekly_amount = commitment.amount_due(now).map_err(|e| e.to_string())?;
    let live_split = if weekly_amount > 0.0 {
        Some(
            commitment
                .credit_deposit(weekly_amount)
                .map_err(|e| e.to_string())?,
        )
    } else {
        None
    };

    Ok(ContributionResponse {
        tier: commitment.plan.tier,
        created_at: Some(created_at),
        elapsed_years,
        weekly_amount,
        live_split,
        weekly_overhead: Some(commitment.weekly_overhead().total()),
    })
}

/// Runs one projection for the command line and renders it as JSON.
pub fn run_projection(args: ProjectArgs) -> Result<String, String> {
    let request = build_params(args)?;
    for warning in &request.warnings {
        warn!("{warning}");
    }
    let response = build_simulate_response(&request);
    serde_json::to_string_pretty(&response).map_err(|e| format!("Failed to render JSON: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("strands HTTP API listening on http://{addr}");

    axum::serve(listener, router()).await
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/contribution", get(contribution_handler))
        .fallback(not_found_handler)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = %msg, "rejected projection request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };
    for warning in &request.warnings {
        warn!("{warning}");
    }

    let response = build_simulate_response(&request);
    info!(
        tier = request.params.plan.tier.map(IntensityTier::name).unwrap_or("none"),
        horizon_years = request.params.horizon_years,
        snapshots = response.snapshots.len(),
        final_value = response.summary.final_value,
        "projection complete"
    );
    json_response(StatusCode::OK, response)
}

async fn contribution_handler(Query(query): Query<ContributionQuery>) -> Response {
    match contribution_response(query, Utc::now()) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => {
            warn!(error = %msg, "rejected contribution request");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
