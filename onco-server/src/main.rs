//! Onco运维命令行

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use onco_admin::{init_logging, ConfigManager, OncoConfig, StoreBackend};
use onco_core::utils::today;
use onco_core::{
    Guidance, PatientReport, Recommendation, Record, RecordId, ReportStatus, ReportType, Severity,
};
use onco_store::{
    tables, MemoryGateway, OrderBy, PersistenceGateway, RestGateway, RestGatewayConfig,
};
use onco_workflow::{ProcedureAgenda, Repositories, Repository, TriageEngine};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "onco-server")]
#[command(about = "肿瘤治疗随访系统运维工具")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 刷新并输出一张数据表（每行一条 JSON）
    List {
        /// 数据表名
        table: String,
    },
    /// 刷新全部仓库并输出医生端概览
    Summary,
    /// 用示例报告演示分诊流程
    TriageDemo,
    /// 输出示例预约中即将到来的部分
    Agenda,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::new(args.config.as_deref())?;
    let mut config = manager.get_config().await;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging)?;

    info!("Starting onco-server ({:?} backend)", config.store.backend);

    match args.command {
        Command::List { table } => list_table(&config, &table).await,
        Command::Summary => print_summary(&config).await,
        Command::TriageDemo => triage_demo(),
        Command::Agenda => print_agenda(&config),
    }
}

/// 根据配置创建网关
fn build_gateway(config: &OncoConfig) -> Result<Arc<dyn PersistenceGateway>> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store, all tables start empty");
            Ok(Arc::new(MemoryGateway::new()))
        }
        StoreBackend::Rest => {
            let gateway = RestGateway::new(RestGatewayConfig {
                base_url: config.store.base_url.clone(),
                api_key: config.store.api_key.clone(),
                connect_timeout: config.store.request_timeout(),
            })
            .context("Failed to create REST gateway")?;
            Ok(Arc::new(gateway))
        }
    }
}

fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

async fn print_repository<T: Record>(repository: &Repository<T>) -> Result<()> {
    repository
        .refresh()
        .await
        .with_context(|| format!("Failed to refresh {}", repository.table()))?;
    for record in repository.all().await {
        print_json_line(&record)?;
    }
    Ok(())
}

async fn list_table(config: &OncoConfig, table: &str) -> Result<()> {
    let gateway = build_gateway(config)?;
    let repos = Repositories::new(gateway.clone(), config.store.request_timeout());

    match table {
        tables::TREATMENTS => print_repository(&repos.treatments).await,
        tables::EXAMS => print_repository(&repos.exams).await,
        tables::PRESCRIPTIONS => print_repository(&repos.prescriptions).await,
        tables::NURSE_PRESCRIPTIONS => print_repository(&repos.nurse_prescriptions).await,
        tables::SIDE_EFFECTS => print_repository(&repos.side_effects).await,
        tables::PATIENT_REPORTS | tables::GUIDANCES => {
            let rows = gateway.list(table, &OrderBy::newest_first()).await?;
            for row in rows {
                print_json_line(&row)?;
            }
            Ok(())
        }
        other => bail!("Unknown table: {} (expected one of {:?})", other, tables::ALL),
    }
}

async fn print_summary(config: &OncoConfig) -> Result<()> {
    let gateway = build_gateway(config)?;
    let repos = Repositories::new(gateway, config.store.request_timeout());

    for (table, error) in repos.refresh_all().await {
        warn!("Refresh of {} failed, using cached data: {}", table, error);
    }

    let summary = repos.summary().await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// 示例报告，其中一条已由护士解决
fn sample_triage() -> Result<TriageEngine> {
    let date = today();
    let report = |id: &str,
                  report_type: ReportType,
                  description: &str,
                  severity: Option<Severity>| PatientReport {
        id: RecordId::from(id),
        date,
        report_type,
        description: description.to_string(),
        medication: None,
        severity,
        status: ReportStatus::Pending,
        response: None,
    };

    let mut resolved = report(
        "1",
        ReportType::SideEffect,
        "Náusea leve após a sessão",
        Some(Severity::Mild),
    );
    resolved.status = ReportStatus::Resolved;
    resolved.response = Some("Orientado hidratação e repouso.".to_string());

    let reports = vec![
        resolved,
        report(
            "2",
            ReportType::Question,
            "Posso tomar o medicamento com alimentos?",
            None,
        ),
        report(
            "3",
            ReportType::SideEffect,
            "Náusea intensa após medicação matinal",
            Some(Severity::Severe),
        ),
        report("4", ReportType::Urgent, "Febre de 38,5°C", None),
    ];
    let guidances = vec![Guidance {
        id: RecordId::from("5"),
        date,
        report_id: RecordId::from("1"),
        recommendation: Recommendation::HomeTreatment,
        instructions: "Orientado hidratação e repouso.".to_string(),
    }];

    Ok(TriageEngine::seed(reports, guidances)?)
}

fn triage_demo() -> Result<()> {
    let mut engine = sample_triage()?;

    println!("Urgent reports:");
    for report in engine.list_urgent() {
        println!("  [{}] {} ({})", report.id, report.description, report.status);
    }

    println!("Pending reports:");
    for report in engine.list_pending() {
        println!("  [{}] {}", report.id, report.description);
    }

    let target = RecordId::from("3");
    engine.mark_in_analysis(&target)?;
    let guidance = engine.submit_guidance(
        &target,
        Recommendation::HospitalVisit,
        "Comparecer ao pronto atendimento para avaliação.",
    )?;
    println!("Resolved report {} with guidance {}", target, guidance.id);

    println!("{}", serde_json::to_string_pretty(&engine.overview())?);
    Ok(())
}

fn print_agenda(config: &OncoConfig) -> Result<()> {
    let today = today();
    let mut agenda = ProcedureAgenda::new();
    agenda.add_procedure("Tomografia de Tórax", "Jejum de 4 horas.", today + Duration::days(3))?;
    agenda.add_procedure("Consulta Oncologista", "Levar exames anteriores.", today + Duration::days(7))?;
    agenda.add_procedure("Sessão de Quimioterapia", "Chegar 30 min antes.", today + Duration::days(15))?;

    for item in agenda.upcoming(today, config.schedule.upcoming_window_days) {
        println!(
            "{} em {} dia(s): {} ({})",
            item.procedure.date, item.days_until, item.procedure.name, item.procedure.preparation
        );
    }
    Ok(())
}
