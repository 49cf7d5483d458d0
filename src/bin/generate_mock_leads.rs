//! Utility to write a synthetic lead dataset for exercising the verifier in
//! mock mode.

use clap::Parser;
use rand::Rng;
use serde_json::json;
use std::path::PathBuf;

use rust_lead_verifier::models::Lead;
use rust_lead_verifier::storage::write_json_atomic;

const NAMES: &[&str] = &[
    "Dra. Ana García López",
    "Psic. Carlos Mendoza Ruiz",
    "Dr. Roberto Silva Torres",
    "Dra. María Fernández Cruz",
    "Psic. Laura Jiménez Mora",
    "Dr. Eduardo Vega Soto",
    "Dra. Patricia Herrera Díaz",
    "Psic. Alejandro Ramos Núñez",
    "Dra. Sofía Castro Reyes",
    "Dr. Miguel Ángel Flores Gutiérrez",
];

const ORGANIZATIONS: &[&str] = &[
    "Centro de Psicología Integral",
    "Clínica Mente Sana",
    "Consultorio Psicológico del Sur",
    "Instituto de Salud Mental CDMX",
    "Centro Terapéutico Humanista",
    "Psicoterapia Avanzada",
];

const LOCALITIES: &[(&str, &str)] = &[
    ("Del Valle", "Benito Juárez"),
    ("Condesa", "Cuauhtémoc"),
    ("Coyoacán", "Coyoacán"),
    ("Polanco", "Miguel Hidalgo"),
    ("Tlalpan Centro", "Tlalpan"),
    ("Roma Norte", "Cuauhtémoc"),
    ("Narvarte", "Benito Juárez"),
    ("Pedregal", "Álvaro Obregón"),
];

const NICHES: &[&str] = &["psicologo", "psiquiatra", "terapeuta", "clinica_salud_mental"];

#[derive(Debug, Parser)]
#[command(name = "generate_mock_leads", about = "Write a synthetic lead dataset")]
struct Args {
    /// Number of records (capped at twice the name table).
    #[arg(long, default_value_t = 20)]
    count: usize,

    #[arg(long, default_value = "leads_raw.json")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let count = args.count.min(NAMES.len() * 2);
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let mut rng = rand::rng();

    let leads: Vec<Lead> = (0..count)
        .map(|i| {
            let (neighborhood, district) = LOCALITIES[i % LOCALITIES.len()];
            let mut lead = Lead {
                phone: Some(format!("+5255{}", rng.random_range(10_000_000..=99_999_999))),
                name: Some(NAMES[i % NAMES.len()].to_string()),
                organization: Some(ORGANIZATIONS[i % ORGANIZATIONS.len()].to_string()),
                title: Some("Psicólogo / Director".to_string()),
                neighborhood: Some(neighborhood.to_string()),
                district: Some(district.to_string()),
                niche: Some(NICHES[i % NICHES.len()].to_string()),
                source: Some("Mock".to_string()),
                ..Lead::default()
            };
            lead.extra.insert("extracted_on".to_string(), json!(today));
            lead
        })
        .collect();

    write_json_atomic(&args.output, &json!({ "leads": leads }))?;
    println!("Wrote {} mock leads to {}", leads.len(), args.output.display());

    Ok(())
}
