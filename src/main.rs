use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use conduit_core::{BridgeConfig, DynamicValue, ModuleContext, ScriptCallFormatter};
use conduit_host::{
    create_bridge, spawn_host, BridgeHost, ChannelSink, Dispatcher, EchoModule, EventEmitter,
    ModuleRegistry, ScriptSink,
};
use conduit_telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Line-oriented bridge host: request JSON in on stdin, script calls out on
/// stdout.
#[derive(Debug, Parser)]
#[command(name = "conduit", version, about)]
struct Cli {
    /// Script namespace for delivered calls (overrides --config).
    #[arg(long)]
    namespace: Option<String>,

    /// Default log level; RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Log output format: json or pretty.
    #[arg(long, default_value = "json")]
    log_format: LogFormat,

    /// Disable a module by name. Repeatable.
    #[arg(long = "disable", value_name = "MODULE")]
    disabled: Vec<String>,

    /// Bridge settings as a JSON object.
    #[arg(long, value_name = "JSON")]
    config: Option<String>,

    /// Inbound queue capacity.
    #[arg(long, default_value_t = 256)]
    queue: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = init_telemetry(&TelemetryConfig {
        log_level: cli.log_level,
        module_levels: Vec::new(),
        format: cli.log_format,
    })?;
    tracing::debug!(filter = telemetry.directive(), format = %telemetry.format(), "telemetry ready");

    let mut config = match cli.config.as_deref() {
        Some(text) => BridgeConfig::from_json(text).context("invalid --config")?,
        None => BridgeConfig::default(),
    };
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
        config.validate().context("invalid --namespace")?;
    }
    for name in &cli.disabled {
        config.flags.set(name.clone(), false);
    }

    let registry = Arc::new(ModuleRegistry::new());
    registry.register_when_enabled(Arc::new(EchoModule::new()), &config.flags);
    tracing::info!(
        namespace = %config.namespace,
        modules = ?registry.registered_module_names(),
        disabled = ?config.flags.disabled(),
        "starting bridge host"
    );

    let formatter = ScriptCallFormatter::new(config.namespace.clone())?;
    let (sink, mut calls) = ChannelSink::new();
    let sink: Arc<dyn ScriptSink> = Arc::new(sink);

    let emitter = EventEmitter::default();
    let events = create_bridge(&emitter, Arc::clone(&sink), formatter.clone());

    let context = ModuleContext::new()
        .with_flags(config.flags.clone())
        .with_extension(emitter.clone());
    let host = Arc::new(
        BridgeHost::new(Dispatcher::new(registry), sink)
            .with_formatter(formatter)
            .with_context(context),
    );

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(call) = calls.recv().await {
            stdout.write_all(call.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let (tx, rx) = mpsc::channel(cli.queue.max(1));
    let hosting = spawn_host(Arc::clone(&host), rx);

    emitter.emit(
        "bridge.ready",
        Some(DynamicValue::from_iter([("namespace", config.namespace.as_str())])),
    );

    let forwarded = forward_lines(BufReader::new(tokio::io::stdin()), &tx).await;
    tracing::debug!(forwarded, "input finished");

    // Closing the inbound queue lets the host drain; dropping the last
    // emitter and sink handles then lets the event bridge and writer finish.
    drop(tx);
    hosting.await?;
    drop(host);
    drop(emitter);
    events.await?;
    writer.await??;

    tracing::info!("stdin closed, shut down");
    Ok(())
}

/// Forward each non-blank input line to the host, returning how many were
/// sent.
///
/// Lines that are not UTF-8 are forwarded lossily so the host still answers
/// them with an invalid-payload failure. A read error ends input like EOF so
/// in-flight work can drain.
async fn forward_lines<R>(mut reader: R, tx: &mpsc::Sender<String>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut forwarded = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "failed to read input, treating as end of input");
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf);
        if matches!(text, std::borrow::Cow::Owned(_)) {
            tracing::warn!(len = buf.len(), "input line is not valid UTF-8");
        }
        let line = text.trim();
        if line.is_empty() {
            continue;
        }
        if tx.send(line.to_owned()).await.is_err() {
            tracing::warn!("host stopped accepting messages");
            break;
        }
        forwarded += 1;
    }
    forwarded
}
