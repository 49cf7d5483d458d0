use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::executor::{CooldownRange, ExecutorSettings};
use crate::mock_gateway::MockStrategy;
use crate::normalize::PhoneRules;
use crate::pipeline::PipelineConfig;
use crate::rate_limiter::RateLimiter;
use crate::session::{BootstrapPolicy, SessionMode};

/// Command-line surface. Every flag can also come from the environment
/// (or a `.env` file).
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lead-verifier",
    version,
    about = "Resumable, rate-limited contact-channel verification for lead datasets"
)]
pub struct Cli {
    /// Candidate dataset (bare list or object with a `leads` field).
    #[arg(long, env = "VERIFIER_INPUT", default_value = "leads_raw.json")]
    pub input: PathBuf,

    /// Merged, verified dataset.
    #[arg(long, env = "VERIFIER_OUTPUT", default_value = "leads_verified.json")]
    pub output: PathBuf,

    #[arg(
        long,
        env = "VERIFIER_CHECKPOINT",
        default_value = "verification_checkpoint.json"
    )]
    pub checkpoint: PathBuf,

    /// Continue an interrupted run from its checkpoint.
    #[arg(long, env = "VERIFIER_RESUME")]
    pub resume: bool,

    /// Maximum gateway calls per rate window.
    #[arg(long, env = "VERIFIER_MAX_PER_HOUR", default_value_t = 40)]
    pub max_per_hour: u32,

    /// Rate window length in seconds.
    #[arg(long, env = "VERIFIER_WINDOW_SECS", default_value_t = 3600)]
    pub window_secs: u64,

    /// Extra wait after a forced rate-limit pause, in seconds.
    #[arg(long, env = "VERIFIER_SAFETY_MARGIN_SECS", default_value_t = 5)]
    pub safety_margin_secs: u64,

    /// Minimum cool-down between calls, in seconds.
    #[arg(long, env = "VERIFIER_COOLDOWN_MIN")]
    pub cooldown_min: Option<f64>,

    /// Maximum cool-down between calls, in seconds.
    #[arg(long, env = "VERIFIER_COOLDOWN_MAX")]
    pub cooldown_max: Option<f64>,

    /// Hard timeout for one verification call, in seconds.
    #[arg(long, env = "VERIFIER_CALL_TIMEOUT_SECS", default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Flush output and checkpoint after this many records.
    #[arg(long, env = "VERIFIER_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: usize,

    /// Stop after this many consecutive inconclusive checks (0 disables).
    #[arg(long, env = "VERIFIER_MAX_CONSECUTIVE_INCONCLUSIVE", default_value_t = 10)]
    pub max_consecutive_inconclusive: u32,

    /// Dry run: no session, simulated outcomes.
    #[arg(long, env = "VERIFIER_MOCK")]
    pub mock: bool,

    #[arg(long, env = "VERIFIER_MOCK_STRATEGY", value_enum, default_value_t = MockStrategy::Deterministic)]
    pub mock_strategy: MockStrategy,

    /// A human is present to complete the session bootstrap.
    #[arg(long, env = "VERIFIER_ATTENDED")]
    pub attended: bool,

    /// How long to wait for the bootstrap, in seconds.
    #[arg(long, env = "VERIFIER_BOOTSTRAP_TIMEOUT_SECS", default_value_t = 180)]
    pub bootstrap_timeout_secs: u64,

    /// Session sidecar base URL.
    #[arg(long, env = "VERIFIER_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    #[arg(long, env = "VERIFIER_GATEWAY_TOKEN", hide_env_values = true)]
    pub gateway_token: Option<String>,

    /// Where the established session id is kept between runs.
    #[arg(long, env = "VERIFIER_SESSION_FILE", default_value = "session/session.json")]
    pub session_file: PathBuf,

    /// Country calling code used when normalizing phone numbers.
    #[arg(long, env = "VERIFIER_COUNTRY_CODE", default_value = "52")]
    pub country_code: String,

    /// Area code prepended to 8-digit local numbers.
    #[arg(long, env = "VERIFIER_DEFAULT_AREA_CODE", default_value = "55")]
    pub default_area_code: String,

    #[arg(short, long, env = "VERIFIER_VERBOSE")]
    pub verbose: bool,
}

/// Which session gateway the run uses.
#[derive(Debug, Clone)]
pub enum GatewayConfig {
    Mock(MockStrategy),
    Remote {
        base_url: String,
        token: Option<String>,
        session_file: PathBuf,
        request_timeout: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RateSettings {
    pub max_per_window: u32,
    pub window: Duration,
    pub safety_margin: Duration,
}

impl RateSettings {
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.max_per_window, self.window, self.safety_margin)
    }
}

/// Validated run configuration, passed explicitly to the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub rate: RateSettings,
    pub executor: ExecutorSettings,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        if cli.max_per_hour == 0 {
            anyhow::bail!("--max-per-hour must be at least 1");
        }
        if cli.window_secs == 0 {
            anyhow::bail!("--window-secs must be greater than 0");
        }
        if cli.batch_size == 0 {
            anyhow::bail!("--batch-size must be at least 1");
        }
        if cli.call_timeout_secs == 0 {
            anyhow::bail!("--call-timeout-secs must be greater than 0");
        }

        let (default_min, default_max): (f64, f64) =
            if cli.mock { (0.1, 0.3) } else { (5.0, 10.0) };
        let cooldown_min = cli.cooldown_min.unwrap_or(default_min);
        let cooldown_max = cli.cooldown_max.unwrap_or(default_max.max(cooldown_min));
        if !(cooldown_min.is_finite() && cooldown_max.is_finite()) || cooldown_min < 0.0 {
            anyhow::bail!("cool-down values must be non-negative numbers");
        }
        if cooldown_min > cooldown_max {
            anyhow::bail!(
                "--cooldown-min ({}) must not exceed --cooldown-max ({})",
                cooldown_min,
                cooldown_max
            );
        }
        let cooldown = CooldownRange::new(
            seconds("--cooldown-min", cooldown_min)?,
            seconds("--cooldown-max", cooldown_max)?,
        );

        let phone_rules = PhoneRules {
            country_code: digits_only("--country-code", &cli.country_code)?,
            default_area_code: digits_only("--default-area-code", &cli.default_area_code)?,
        };

        let call_timeout = Duration::from_secs(cli.call_timeout_secs);
        let gateway = if cli.mock {
            GatewayConfig::Mock(cli.mock_strategy)
        } else {
            let base_url = cli
                .gateway_url
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("--gateway-url (VERIFIER_GATEWAY_URL) is required unless --mock is set")
                })?;
            let parsed = url::Url::parse(&base_url)
                .map_err(|e| anyhow::anyhow!("--gateway-url is not a valid URL: {}", e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("--gateway-url must start with http:// or https://");
            }
            GatewayConfig::Remote {
                base_url,
                token: cli.gateway_token.filter(|t| !t.trim().is_empty()),
                session_file: cli.session_file,
                request_timeout: call_timeout,
            }
        };

        let config = Self {
            pipeline: PipelineConfig {
                input: cli.input,
                output: cli.output,
                checkpoint: cli.checkpoint,
                resume: cli.resume,
                batch_size: cli.batch_size,
                session_mode: if cli.attended {
                    SessionMode::Attended
                } else {
                    SessionMode::Unattended
                },
                bootstrap: BootstrapPolicy {
                    timeout: Duration::from_secs(cli.bootstrap_timeout_secs),
                    ..BootstrapPolicy::default()
                },
                phone_rules,
            },
            rate: RateSettings {
                max_per_window: cli.max_per_hour,
                window: Duration::from_secs(cli.window_secs),
                safety_margin: Duration::from_secs(cli.safety_margin_secs),
            },
            executor: ExecutorSettings {
                cooldown,
                call_timeout,
                breaker_threshold: cli.max_consecutive_inconclusive,
            },
            gateway,
        };

        tracing::debug!("Input: {}", config.pipeline.input.display());
        tracing::debug!("Output: {}", config.pipeline.output.display());
        tracing::debug!(
            "Rate: {} per {:?}, cool-down {:?}..{:?}",
            config.rate.max_per_window,
            config.rate.window,
            config.executor.cooldown.min,
            config.executor.cooldown.max
        );
        if let GatewayConfig::Remote { ref base_url, .. } = config.gateway {
            tracing::info!("Session gateway configured: {}", base_url);
        }

        Ok(config)
    }
}

fn digits_only(flag: &str, value: &str) -> anyhow::Result<String> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("{} must contain digits only, got '{}'", flag, value);
    }
    Ok(value.to_string())
}

fn seconds(flag: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| anyhow::anyhow!("{} is out of range ({}): {}", flag, value, e))
}
