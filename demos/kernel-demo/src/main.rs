//! Wires mock backends into the kernel and runs a few calls through it.
//!
//! Configuration comes from the `KERNEL_*` environment variables; try
//! `KERNEL_AUTH_ENABLED=true` to see denials.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde_json::{Value, json};
use shale_kernel::config::KernelConfig;
use shale_kernel::kernel::{DetailLevel, KernelExecutor};
use shale_kernel::primitives::{Role, UserIdentity};
use shale_kernel::telemetry::{self, TelemetryConfig};
use shale_kernel::tools::{
    ToolClassification, ToolDescriptor, ToolError, ToolProvider, ToolRegistry,
    ToolRegistryBuilder, ToolResult,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Run sample tool calls through the kernel")]
struct Args {
    /// Detail level for successful results.
    #[arg(long, default_value = "standard")]
    detail: DetailLevel,
    /// Role used for every call.
    #[arg(long, default_value = "analyst")]
    role: Role,
}

struct Geowiz;

impl ToolProvider for Geowiz {
    fn name(&self) -> &str {
        "geowiz"
    }

    fn register(&self, builder: &mut ToolRegistryBuilder) -> ToolResult<()> {
        builder
            .register(
                ToolDescriptor::new("geowiz.parse_las_file", ToolClassification::Query)?
                    .with_description("Parse a LAS well log"),
                |args: Value| async move {
                    let file = args["file"].as_str().unwrap_or("unknown.las").to_owned();
                    Ok(json!({
                        "file": file,
                        "curves": ["GR", "RHOB", "NPHI", "DT"],
                        "depthRangeFt": [4200, 12450],
                    }))
                },
            )?
            .register(
                ToolDescriptor::new("geowiz.list_formats", ToolClassification::Discovery)?,
                |_: Value| async move { Ok(json!(["las", "dlis", "segy"])) },
            )?;
        Ok(())
    }
}

struct Econobot;

impl ToolProvider for Econobot {
    fn name(&self) -> &str {
        "econobot"
    }

    fn register(&self, builder: &mut ToolRegistryBuilder) -> ToolResult<()> {
        builder
            .register(
                ToolDescriptor::new("econobot.npv", ToolClassification::Query)?,
                |args: Value| async move {
                    let Some(rate) = args["discountRate"].as_f64() else {
                        return Err(ToolError::validation("discountRate must be a number"));
                    };
                    Ok(json!({ "npvUsd": 4_200_000.0 / (1.0 + rate) }))
                },
            )?
            .register(
                ToolDescriptor::new("econobot.fetch_strip", ToolClassification::Query)?,
                |_: Value| async move { Err(ToolError::connection("pricing feed unreachable")) },
            )?;
        Ok(())
    }
}

struct Reporter;

impl ToolProvider for Reporter {
    fn name(&self) -> &str {
        "reporter"
    }

    fn register(&self, builder: &mut ToolRegistryBuilder) -> ToolResult<()> {
        builder.register(
            ToolDescriptor::new("reporter.generate_report", ToolClassification::Command)?,
            |args: Value| async move {
                Ok(json!({ "title": args["title"], "sections": 6, "status": "rendered" }))
            },
        )?;
        Ok(())
    }
}

struct Decision;

impl ToolProvider for Decision {
    fn name(&self) -> &str {
        "decision"
    }

    fn register(&self, builder: &mut ToolRegistryBuilder) -> ToolResult<()> {
        builder.register(
            ToolDescriptor::new("decision.make_investment_decision", ToolClassification::Command)?,
            |_: Value| async move { Ok(json!({ "decision": "proceed", "confidence": 0.72 })) },
        )?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = KernelConfig::from_env()?;
    telemetry::init(&TelemetryConfig::from(&config));

    let mut builder = ToolRegistry::builder();
    builder
        .provider(&Geowiz)?
        .provider(&Econobot)?
        .provider(&Reporter)?
        .provider(&Decision)?;
    let executor = KernelExecutor::from_config(&config, Arc::new(builder.build()));

    let identity = UserIdentity::builder("demo-user", args.role).build()?;
    info!(role = %identity.role(), session = %identity.session_id(), "starting demo calls");

    let calls = [
        (
            "geowiz.parse_las_file",
            json!({ "file": "permian-7.las", "apiKey": "abc123" }),
        ),
        ("econobot.npv", json!({ "discountRate": 0.1 })),
        ("econobot.npv", json!({ "discountRate": "ten" })),
        ("econobot.fetch_strip", json!({})),
        ("reporter.generate_report", json!({ "title": "Q3 review" })),
        ("decision.make_investment_decision", json!({ "prospect": "A-12" })),
        ("seismic.migrate", json!({})),
    ];

    for (tool, call_args) in calls {
        let outcome = match executor
            .call_tool_with_detail(tool, call_args, &identity, args.detail)
            .await
        {
            Ok(result) => json!({ "tool": tool, "ok": result }),
            Err(err) => json!({ "tool": tool, "error": err }),
        };
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    info!(
        audit_failures = executor.audit().failure_count(),
        "demo finished"
    );
    Ok(())
}
