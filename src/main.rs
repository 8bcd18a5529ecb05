use anyhow::Context;
use inspection_domain::{ContainerType, NewRunInput, RunId, StepId, StepOutcome};
use inspection_store::WorkspaceRepository;
use inspection_workflow::{into_action_result, InspectionConfig, InspectionService, QrBinding};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pequeño menú interactivo para operar los runs de inspección de un
/// workspace.
///
/// Por defecto usa el repositorio en memoria; con la feature `sql` usa el
/// repositorio Diesel configurado por `INSPECTION_DB_URL`.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                             .init();
    let config = InspectionConfig::from_env().context("configuración de inspección")?;
    let workspace = std::env::var("INSPECTION_WORKSPACE").unwrap_or_else(|_| "demo".to_string());
    let user = std::env::var("INSPECTION_USER").unwrap_or_else(|_| "cli".to_string());
    info!(workspace = %workspace, concurrency = ?config.concurrency, "iniciando inspection-cli");

    #[cfg(feature = "sql")]
    let svc = {
        let repo = Arc::new(inspection_persistence::new_from_env().context("repositorio Diesel")?);
        let audit = Arc::new(repo.audit_sink());
        InspectionService::new(repo, config).with_audit_sink(audit)
    };
    #[cfg(not(feature = "sql"))]
    let svc = InspectionService::new(Arc::new(inspection_store::InMemoryWorkspaceRepository::new()), config);
    run_menu(&svc, &workspace, &user)
}

fn run_menu<R: WorkspaceRepository>(svc: &InspectionService<R>, workspace: &str, user: &str) -> anyhow::Result<()> {
    svc.ensure_workspace(workspace)?;
    loop {
        println!("\n== Inspección [{}] ==", workspace);
        println!("1) Ver runs");
        println!("2) Crear run");
        println!("3) Registrar paso");
        println!("4) Vincular QR");
        println!("5) Poner en hold");
        println!("6) Liberar hold");
        println!("7) Cancelar run");
        println!("8) Dividir run");
        println!("9) Agrupar runs");
        println!("10) Resumen");
        println!("0) Salir");
        let choice = prompt("Elige una opción: ")?;
        match choice.trim() {
            "1" => list_runs(svc, workspace),
            "2" => {
                let kind: ContainerType = match prompt("Tipo de contenedor (drum, tote, ...): ")?.trim().parse() {
                    Ok(k) => k,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                let count: i64 = prompt("Cantidad de contenedores: ")?.trim().parse().unwrap_or(1);
                let sku = optional(prompt("SKU (enter para vacío): ")?);
                let material = optional(prompt("Material (enter para vacío): ")?);
                let input = NewRunInput { item_key: None,
                                          sku,
                                          material_name: material,
                                          container_type: kind,
                                          container_count: count };
                report(svc.create_inspection_runs(workspace, &[input], user));
            }
            "3" => {
                let run_id = read_run_id()?;
                let step: StepId = match prompt("Paso (scan_qr, inspection_info, ...): ")?.parse() {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                let outcome: StepOutcome = match prompt("Resultado (PASS/FAIL/HOLD): ")?.parse() {
                    Ok(o) => o,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                let raw = prompt("Payload JSON (una línea): ")?;
                let payload = match serde_json::from_str(raw.trim()) {
                    Ok(v) => v,
                    Err(e) => {
                        eprintln!("JSON inválido: {}", e);
                        continue;
                    }
                };
                report(svc.record_step(workspace, &run_id, step, &payload, outcome, user));
            }
            "4" => {
                let run_id = read_run_id()?;
                let qr = QrBinding { qr_value: prompt("Valor QR: ")?,
                                     qr_code_id: optional(prompt("Id de QR (enter para vacío): ")?),
                                     short_code: optional(prompt("Código corto (enter para vacío): ")?) };
                report(svc.bind_run_to_qr(workspace, &run_id, &qr, user));
            }
            "5" => {
                let run_id = read_run_id()?;
                let reason = optional(prompt("Motivo (enter para vacío): ")?);
                report(svc.hold_inspection_run(workspace, &run_id, reason.as_deref(), user));
            }
            "6" => {
                let run_id = read_run_id()?;
                report(svc.release_inspection_hold(workspace, &run_id, user));
            }
            "7" => {
                let run_id = read_run_id()?;
                let reason = prompt("Motivo de cancelación: ")?;
                report(svc.cancel_inspection_run(workspace, &run_id, &reason, user));
            }
            "8" => {
                let run_id = read_run_id()?;
                let quantity: i64 = match prompt("Contenedores a separar: ")?.trim().parse() {
                    Ok(n) => n,
                    Err(_) => {
                        eprintln!("Cantidad inválida");
                        continue;
                    }
                };
                report(svc.split_inspection_run(workspace, &run_id, quantity, user));
            }
            "9" => {
                let raw = prompt("Ids separados por coma (el primero sobrevive): ")?;
                let ids: Vec<RunId> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(RunId::from).collect();
                report(svc.group_inspection_runs(workspace, &ids, user));
            }
            "10" => report(svc.summary(workspace)),
            "0" => break,
            _ => println!("Opción no válida"),
        }
    }
    Ok(())
}

fn list_runs<R: WorkspaceRepository>(svc: &InspectionService<R>, workspace: &str) {
    let (state, repairs) = match svc.load_state_with_report(workspace) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error leyendo estado: {}", e);
            return;
        }
    };
    if !repairs.is_clean() {
        println!("(documento reparado al leer: {} cambios)", repairs.repairs.len());
    }
    println!("\nID                                   | TIPO     | CANT | ESTADO         | PASO");
    println!("-------------------------------------------------------------------------------------");
    for id in state.run_order() {
        if let Ok(run) = state.run(id) {
            println!("{} | {:<8} | {:>4} | {:<14} | {}",
                     run.id,
                     run.container_type.as_str(),
                     run.container_count,
                     run.status().as_str(),
                     run.current_step_id);
        }
    }
    let totals = state.totals();
    println!("creados={} completados={} en hold={}",
             totals.runs_created, totals.runs_completed, totals.runs_on_hold);
}

/// Imprime el resultado de una operación como `ActionResult` en JSON.
fn report<T: Serialize>(result: Result<T, inspection_workflow::WorkflowError>) {
    let action = into_action_result(result);
    match serde_json::to_string_pretty(&action) {
        Ok(s) if action.success => println!("{}", s),
        Ok(s) => eprintln!("{}", s),
        Err(e) => eprintln!("Error serializando resultado: {}", e),
    }
}

fn read_run_id() -> io::Result<RunId> {
    Ok(RunId::from(prompt("Run id: ")?.trim()))
}

fn optional(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim_end_matches(['\r', '\n']).to_string())
}
