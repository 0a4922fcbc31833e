//! GCS query plan: every tool, then primary tools by language, then
//! primary tools by country

use std::fs;
use std::path::Path;

use anyhow::Context;
use commonscount_core::tool::TOOL_URL_PREFIX;
use commonscount_core::{DimensionSpec, DimensionValue, Plan, ToolScope, build_plan};
use serde::Deserialize;

use crate::config::{
    COUNTRY_COLLECTION_FILE, Config, LANGUAGE_COLLECTION_FILE, TOOL_PATHS_FILE,
};

#[derive(Debug, Deserialize)]
struct CountryEntry {
    country: String,
    cr: String,
}

#[derive(Debug, Deserialize)]
struct LanguageEntry {
    language: String,
    lr: String,
}

/// Legal tool paths, one per line, as `//creativecommons.org/` URLs
pub fn load_tool_urls(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading tool paths {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("{TOOL_URL_PREFIX}{}", line.trim_start_matches('/')))
        .collect())
}

pub fn load_countries(path: &Path) -> anyhow::Result<Vec<DimensionValue>> {
    let entries: Vec<CountryEntry> = read_yaml(path)?;
    Ok(entries
        .into_iter()
        .map(|e| DimensionValue::new(e.country, e.cr))
        .collect())
}

pub fn load_languages(path: &Path) -> anyhow::Result<Vec<DimensionValue>> {
    let entries: Vec<LanguageEntry> = read_yaml(path)?;
    Ok(entries
        .into_iter()
        .map(|e| DimensionValue::new(e.language, e.lr))
        .collect())
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Plan over `tool_urls`; only 4.0 licenses, CC0 and PDM are crossed with
/// languages and countries.
pub fn create_query_plan(
    tool_urls: &[String],
    languages: Vec<DimensionValue>,
    countries: Vec<DimensionValue>,
) -> Plan {
    build_plan(
        tool_urls,
        &[
            DimensionSpec::languages(languages, ToolScope::Primary),
            DimensionSpec::countries(countries, ToolScope::Primary),
        ],
    )
}

/// Build the plan from the input files in `data_dir` and write the artifact
pub fn write_query_plan(data_dir: &Path) -> anyhow::Result<Plan> {
    log::info!("Loading CC legal tool paths");
    let tool_urls = load_tool_urls(&data_dir.join(TOOL_PATHS_FILE))?;
    let languages = load_languages(&data_dir.join(LANGUAGE_COLLECTION_FILE))?;
    let countries = load_countries(&data_dir.join(COUNTRY_COLLECTION_FILE))?;

    let plan = create_query_plan(&tool_urls, languages, countries);
    log::info!("Plan entries: {}", plan.len());

    let path = Config::plan_path(data_dir);
    plan.write_csv(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("Saved query plan to {}", path.display());
    Ok(plan)
}

/// Read a plan artifact written by [`write_query_plan`]
pub fn read_query_plan(path: &Path) -> anyhow::Result<Plan> {
    Plan::read_csv(path).with_context(|| {
        format!(
            "reading query plan {} (run `commonscount plan` first)",
            path.display()
        )
    })
}
