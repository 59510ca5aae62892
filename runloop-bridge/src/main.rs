use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use runloop_bridge::sim::{RunLoopMode, SimDispatcher, SimNativeLoop};
use runloop_bridge::{BridgeConfig, ContextId, CoordinationState, InvocationBridge, PerformerRegistry};

/// Drive the invocation bridge against the in-process native loop and
/// dispatch thread, then print a JSON report.
#[derive(Parser, Debug)]
#[command(name = "runloop-bridge-demo", version)]
struct Args {
    /// JSON file with bridge settings; missing fields keep their defaults.
    #[arg(long, env = "RUNLOOP_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Performer wait limit in milliseconds (overrides config and env).
    #[arg(long)]
    wait_limit_ms: Option<u64>,

    /// Threads issuing concurrent blocking calls.
    #[arg(long, default_value_t = 8, env = "RUNLOOP_BRIDGE_DEMO_CALLERS")]
    callers: usize,

    /// Pretty-print the report.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct Report {
    config: BridgeConfig,
    scenarios: Vec<ScenarioReport>,
    blocking_depth: usize,
    mediator_events: usize,
    dispatched: usize,
}

#[derive(Serialize)]
struct ScenarioReport {
    name: &'static str,
    ok: bool,
    detail: String,
    elapsed_ms: u128,
}

fn main() -> Result<()> {
    let json_logs = std::env::var("RUNLOOP_BRIDGE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("runloop_bridge=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let args = Args::parse();
    let config = load_config(&args)?;
    tracing::info!(
        wait_limit_ms = config.performer_wait_limit_ms,
        callers = args.callers,
        "starting bridge demo"
    );

    let native = Arc::new(SimNativeLoop::new());
    native.attach_current_thread();
    let dispatcher = SimDispatcher::start("app-dispatch").context("failed to start dispatch thread")?;
    let coordination = Arc::new(CoordinationState::new());
    let bridge = InvocationBridge::new(native.clone(), dispatcher.clone())
        .with_coordination(Arc::clone(&coordination))
        .with_registry(Arc::new(PerformerRegistry::new(config.clone())));

    let context = ContextId::new(1);
    let scenarios = vec![
        run_scenario("typed_call", || typed_call(&bridge, context)),
        run_scenario("reentrant_call", || reentrant_call(&bridge, context)),
        run_scenario("concurrent_callers", || concurrent_callers(&bridge, context, args.callers)),
        run_scenario("native_round_trip", || native_round_trip(&bridge, &native, context)),
        run_scenario("invoke_later", || invoke_later(&bridge, context)),
    ];

    dispatcher.shutdown();
    let report = Report {
        config,
        scenarios,
        blocking_depth: coordination.blocking_depth(),
        mediator_events: native.journal().len(),
        dispatched: dispatcher.dispatched_count(),
    };
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{rendered}");

    if report.scenarios.iter().any(|scenario| !scenario.ok) {
        anyhow::bail!("one or more scenarios failed");
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<BridgeConfig> {
    let base = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            BridgeConfig::from_json(&json)?
        }
        None => BridgeConfig::default(),
    };
    let mut config = base.with_overrides(|key| std::env::var(key).ok());
    if let Some(wait_limit_ms) = args.wait_limit_ms {
        config.performer_wait_limit_ms = wait_limit_ms;
    }
    Ok(config)
}

fn run_scenario(name: &'static str, scenario: impl FnOnce() -> Result<String>) -> ScenarioReport {
    let started = Instant::now();
    let outcome = scenario();
    let elapsed_ms = started.elapsed().as_millis();
    match outcome {
        Ok(detail) => {
            tracing::info!(scenario = name, elapsed_ms, "{detail}");
            ScenarioReport { name, ok: true, detail, elapsed_ms }
        }
        Err(err) => {
            tracing::warn!(scenario = name, elapsed_ms, "scenario failed: {err:#}");
            ScenarioReport { name, ok: false, detail: format!("{err:#}"), elapsed_ms }
        }
    }
}

fn typed_call(bridge: &InvocationBridge, context: ContextId) -> Result<String> {
    let name = bridge.call_and_wait(
        || Ok(std::thread::current().name().unwrap_or("unnamed").to_string()),
        Some(context),
    )?;
    Ok(format!("callable ran on {name}"))
}

fn reentrant_call(bridge: &InvocationBridge, context: ContextId) -> Result<String> {
    let inner = bridge.clone();
    let value = bridge.call_and_wait(
        move || Ok(inner.call_and_wait(|| Ok(7u32), Some(context))? * 6),
        Some(context),
    )?;
    Ok(format!("nested call on the dispatch thread returned {value}"))
}

fn concurrent_callers(bridge: &InvocationBridge, context: ContextId, callers: usize) -> Result<String> {
    let handles: Vec<_> = (0..callers)
        .map(|index| {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                bridge.invoke_and_wait(
                    move || {
                        if index % 3 == 2 {
                            anyhow::bail!("caller {index} refused");
                        }
                        Ok(())
                    },
                    Some(context),
                )
            })
        })
        .collect();

    let mut failed = 0;
    for handle in handles {
        let outcome = handle
            .join()
            .map_err(|_| anyhow::anyhow!("caller thread panicked"))?;
        if outcome.is_err() {
            failed += 1;
        }
    }
    let depth = bridge.coordination().blocking_depth();
    anyhow::ensure!(depth == 0, "blocking depth left at {depth}");
    Ok(format!("{callers} callers finished, {failed} failed as expected"))
}

/// Native thread → dispatch thread → (offloaded) native thread → dispatch
/// thread, with the last hop diverted into the performer frame.
fn native_round_trip(
    bridge: &InvocationBridge,
    native: &Arc<SimNativeLoop>,
    context: ContextId,
) -> Result<String> {
    let performer = bridge.performer().clone();
    let native = Arc::clone(native);
    let callback = bridge.clone();
    let value = bridge.call_and_wait(
        move || {
            performer
                .perform(move || {
                    let reply = native.perform_on_native_waiting(RunLoopMode::Bridge, move || {
                        callback.call_and_wait(|| Ok(40u32 + 2), Some(context))
                    });
                    Ok(reply.context("native thread dropped the request")??)
                })
                .context("offloaded native call produced no value")
        },
        Some(context),
    )?;
    Ok(format!("round trip through the performer returned {value}"))
}

fn invoke_later(bridge: &InvocationBridge, context: ContextId) -> Result<String> {
    let handle = bridge.invoke_later(|| Err(anyhow::anyhow!("background task failed")), Some(context))?;
    // FIFO: once this returns the posted envelope has run.
    bridge.invoke_and_wait(|| Ok(()), Some(context))?;
    anyhow::ensure!(handle.is_done(), "posted envelope did not run");
    let failure = handle.failure_message().unwrap_or_default();
    Ok(format!("posted envelope {} finished: {failure}", handle.seq()))
}
