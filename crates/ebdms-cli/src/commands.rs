use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use ebdms_ledger::{AuditReader, AuditValidator, FileAuditLedger, InMemoryAuditLedger};
use ebdms_registry::{
    ActorContext, ActorId, AuditAction, AuditEntry, AuditFilter, AuditLedger, Ebdms, EngineConfig, FileKind,
    FilePayload, IndexFormat, MetadataRecord, Project, ProjectId, RecordKind, RegisterOptions,
    RegistrationEngine, Role, ValidationReport,
};
use ebdms_catalog::InMemoryCatalog;
use ebdms_store::InMemoryObjectStore;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Demo(args) => cmd_demo(args, &format).await,
        Command::Verify(args) => cmd_verify(args, &format).await,
        Command::Audit(args) => cmd_audit(args, &format),
        Command::Config(args) => cmd_config(args),
    }
}

fn synthetic_vcf(size: usize) -> Vec<u8> {
    let mut data = b"##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n".to_vec();
    let mut pos = 10_000u64;
    while data.len() < size {
        data.extend_from_slice(format!("chr1\t{pos}\t.\tA\tG\t50\tPASS\tDP=30\n").as_bytes());
        pos += 17;
    }
    data.truncate(size.max(1));
    data
}

/// Run the registration scenario and return the facade it ran on.
async fn run_demo(config: EngineConfig, ledger: Arc<dyn AuditLedger>, size: usize) -> anyhow::Result<Ebdms> {
    let engine = RegistrationEngine::new(
        Arc::new(InMemoryObjectStore::new()),
        Arc::new(InMemoryCatalog::new()),
        ledger,
        config,
    )?;
    let ebdms = Ebdms::new(Arc::new(engine));

    let root = ActorContext::new(ActorId::new("root")?, true).as_superuser();
    let project_id = ProjectId::new("GEN-001")?;
    ebdms
        .register_project(&root, Project::new(project_id.clone(), "GEN", "Genomes pilot"))
        .await?;

    let alice = ActorContext::new(ActorId::new("alice")?, true).with_role(project_id.clone(), Role::Contributor);
    let sample = ebdms
        .create_record(&alice, MetadataRecord::new(project_id.clone(), RecordKind::Sample, "S-0001"))
        .await?;
    let vcf = ebdms
        .register_file(
            &alice,
            &project_id,
            FileKind::Vcf,
            FilePayload::from_bytes(synthetic_vcf(size)),
            RegisterOptions::default().reference(sample.record_id),
        )
        .await?;
    ebdms
        .attach_index(&alice, &vcf.file_id, FilePayload::from_bytes(&b"TBI\x01demo-index"[..]), IndexFormat::Tbi)
        .await?;

    // A viewer without a second factor is turned away.
    let bob = ActorContext::new(ActorId::new("bob")?, false).with_role(project_id, Role::Viewer);
    if let Err(e) = ebdms.fetch_file(&bob, &vcf.file_id).await {
        tracing::debug!(error = %e, "expected denial");
    }
    Ok(ebdms)
}

async fn cmd_demo(args: DemoArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let ledger: Arc<dyn AuditLedger> = match &args.ledger {
        Some(path) => Arc::new(
            FileAuditLedger::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Arc::new(InMemoryAuditLedger::new()),
    };

    let ebdms = run_demo(config, ledger, args.size_kib.saturating_mul(1024)).await?;
    let entries = ebdms.engine().ledger().read_all()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            println!("{} Demo registration complete", "✓".green().bold());
            println!();
            print_entries(&entries);
            println!();
            print_report(&ebdms.validate_audit()?);
        }
    }
    Ok(())
}

async fn cmd_verify(args: VerifyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let report = match &args.ledger {
        Some(path) => {
            let ledger = match FileAuditLedger::open(path) {
                Ok(ledger) => ledger,
                Err(e) => {
                    println!("{} {}: {e}", "✗".red().bold(), path.display());
                    anyhow::bail!("audit ledger failed verification");
                }
            };
            AuditValidator::validate(&ledger)?
        }
        None => {
            let ebdms = run_demo(EngineConfig::default(), Arc::new(InMemoryAuditLedger::new()), 64 * 1024).await?;
            ebdms.verify_audit_chain()?;
            ebdms.validate_audit()?
        }
    };

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "entry_count": report.entry_count,
                "hash_chain_valid": report.hash_chain_valid,
                "sequence_dense": report.sequence_dense,
                "timestamps_monotonic": report.timestamps_monotonic,
                "violations": report.violations.len(),
            })
        ),
        OutputFormat::Text => print_report(&report),
    }
    if let Some(first) = report.first_violation() {
        anyhow::bail!("audit ledger failed verification at sequence {}", first.seq);
    }
    Ok(())
}

fn cmd_audit(args: AuditArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let ledger = FileAuditLedger::open(&args.ledger)
        .with_context(|| format!("opening {}", args.ledger.display()))?;
    let mut filter = AuditFilter::new();
    if let Some(actor) = args.actor {
        filter = filter.actor(ActorId::new(actor)?);
    }
    if let Some(action) = args.action {
        filter = filter.action(action.parse::<AuditAction>()?);
    }
    if let Some(limit) = args.limit {
        filter = filter.limit(limit);
    }
    let entries = ledger.query(&filter)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text if entries.is_empty() => println!("No matching entries."),
        OutputFormat::Text => print_entries(&entries),
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Show => print!("{}", EngineConfig::default().to_toml_string()?),
        ConfigAction::Check { path } => match EngineConfig::load(&path) {
            Ok(_) => println!("{} {} is valid", "✓".green().bold(), path.display()),
            Err(e) => {
                println!("{} {}: {e}", "✗".red().bold(), path.display());
                anyhow::bail!("invalid configuration");
            }
        },
    }
    Ok(())
}

fn print_entries(entries: &[AuditEntry]) {
    for entry in entries {
        let action = entry.action.to_string();
        let action = if entry.action.is_failure() {
            action.red()
        } else if matches!(entry.action, AuditAction::AccessGranted) {
            action.dimmed()
        } else {
            action.green()
        };
        println!(
            "{:>4}  {}  {:<8} {:<18} {} {}",
            entry.sequence_number.to_string().yellow(),
            entry.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
            entry.actor_id.as_str().bold(),
            action,
            entry.subject_type.to_string().cyan(),
            entry.subject_id,
        );
        if let Some(detail) = &entry.detail {
            println!("        {}", detail.dimmed());
        }
    }
}

fn print_report(report: &ValidationReport) {
    let mark = |ok: bool| if ok { "valid".green() } else { "BROKEN".red().bold() };
    if report.is_valid() {
        println!("{} Audit chain verified ({} entries)", "✓".green().bold(), report.entry_count);
    } else {
        println!("{} Audit chain verification failed", "✗".red().bold());
    }
    println!("  Hash chain: {}", mark(report.hash_chain_valid));
    println!("  Sequences:  {}", mark(report.sequence_dense));
    println!("  Timestamps: {}", mark(report.timestamps_monotonic));
    for v in &report.violations {
        println!("  {} seq {}: {:?} {}", "!".red(), v.seq, v.kind, v.description);
    }
}
