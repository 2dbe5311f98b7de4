use anyhow::Result;
use async_trait::async_trait;
use disclosure_scraper::app::ports::HttpClientPort;
use disclosure_scraper::config::Config;
use disclosure_scraper::constants::OPERATOR_NOT_FOUND;
use disclosure_scraper::error::{PipelineError, Result as PipelineResult};
use disclosure_scraper::pipeline::{ArchiveRetriever, Pipeline, PeriodDiscoverer, ReferenceCatalogLoader};
use disclosure_scraper::sink::{CsvFileSink, MemorySink};
use disclosure_scraper::types::ReportingPeriod;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const ROOT: &str = "https://fake.test/PDA/";
const CATEGORY: &str = "https://fake.test/PDA/demonstracoes_contabeis/";
const CATALOG: &str = "https://fake.test/PDA/operadoras/Relatorio_cadop.csv";

/// In-memory file server: listing pages and downloadable blobs keyed by URL.
/// Anything not registered answers 404.
#[derive(Default)]
struct FakeHttp {
    pages: HashMap<String, String>,
    blobs: HashMap<String, Vec<u8>>,
    /// Latency before a download answers, per URL
    delays: HashMap<String, Duration>,
}

impl FakeHttp {
    fn page(mut self, url: &str, hrefs: &[&str]) -> Self {
        let links: String = hrefs
            .iter()
            .map(|h| format!("<a href=\"{h}\">{h}</a>\n"))
            .collect();
        let html = format!(
            "<html><body><a href=\"?C=N;O=D\">Name</a><a href=\"../\">Parent Directory</a>\n{links}</body></html>"
        );
        self.pages.insert(url.to_string(), html);
        self
    }

    fn blob(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.blobs.insert(url.to_string(), bytes);
        self
    }

    fn slow(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }
}

#[async_trait]
impl HttpClientPort for FakeHttp {
    async fn get_text(&self, url: &str) -> PipelineResult<String> {
        self.pages.get(url).cloned().ok_or_else(|| PipelineError::Status {
            url: url.to_string(),
            status: 404,
        })
    }

    async fn download_to(&self, url: &str, dest: &Path) -> PipelineResult<u64> {
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        let bytes = self.blobs.get(url).ok_or_else(|| PipelineError::Status {
            url: url.to_string(),
            status: 404,
        })?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// The regulator's single-byte encoding.
fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

fn zip_archive(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn expense_file(rows: &[&str]) -> Vec<u8> {
    let mut text = String::from("DATA;REG_ANS;CD_CONTA_CONTABIL;DESCRICAO;VL_SALDO_INICIAL;VL_SALDO_FINAL\n");
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    latin1(&text)
}

fn catalog_file() -> Vec<u8> {
    latin1(
        "Registro_ANS;CNPJ;Razao_Social;Modalidade;UF\n\
         123456;11.222.333/0001-44;OPERADORA SAÚDE LTDA;Medicina de Grupo;SP\n\
         ;99999999000199;SEM REGISTRO;Cooperativa;RJ\n\
         654321;55666777000188;COOPERATIVA NORTE;Cooperativa Médica;AM\n",
    )
}

/// Two year folders, three quarters with archives. 3T2023 is listed but never served.
fn regulator_server() -> FakeHttp {
    FakeHttp::default()
        .page(ROOT, &["demonstracoes_contabeis/", "operadoras/", "leiaute/"])
        .page(CATEGORY, &["2023/", "2024/", "README.txt"])
        .page(&format!("{CATEGORY}2023/"), &["3T2023.zip", "4T2023.zip"])
        .page(&format!("{CATEGORY}2024/"), &["1T2024.zip", "Leiaute.pdf"])
        .blob(
            &format!("{CATEGORY}2024/1T2024.zip"),
            zip_archive(&[
                (
                    "1T2024.csv",
                    expense_file(&[
                        "2024-01-01;123456;41111;Eventos;0;1.234,56",
                        "2024-01-01;123456;31111;Receitas;0;999,00",
                        "2024-01-01;777777;411;Eventos;0;10,5",
                    ]),
                ),
                ("Manual_de_leitura.pdf", b"%PDF-1.4".to_vec()),
            ]),
        )
        .blob(
            &format!("{CATEGORY}2023/4T2023.zip"),
            zip_archive(&[(
                "4T2023.csv",
                expense_file(&["2023-10-01;654321;4;Eventos;0;abc"]),
            )]),
        )
        .blob(CATALOG, catalog_file())
}

fn test_config(workdir: &TempDir) -> Config {
    let mut config = Config {
        base_url: ROOT.to_string(),
        catalog_url: CATALOG.to_string(),
        period_count: 3,
        staging_dir: workdir.path().join("downloads"),
        extract_dir: workdir.path().join("extracted"),
        output_path: workdir.path().join("output/consolidado.csv"),
        log_dir: workdir.path().join("logs"),
        ..Config::default()
    };
    config.http.retries = 0;
    config
}

#[tokio::test]
async fn discovery_ranks_periods_most_recent_first() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let discoverer = PeriodDiscoverer::new(Arc::new(regulator_server()), &config);

    let periods = discoverer.discover_top_periods(3).await?;
    let labels: Vec<(i32, u8)> = periods.iter().map(|p| (p.year, p.quarter)).collect();
    assert_eq!(labels, vec![(2024, 1), (2023, 4), (2023, 3)]);
    assert_eq!(periods[0].source_url, format!("{CATEGORY}2024/1T2024.zip"));

    let fewer = discoverer.discover_top_periods(2).await?;
    assert_eq!(fewer.len(), 2);

    let more = discoverer.discover_top_periods(10).await?;
    assert_eq!(more.len(), 3);
    Ok(())
}

#[tokio::test]
async fn discovery_without_category_folder_is_fatal() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let server = FakeHttp::default().page(ROOT, &["operadoras/", "despesas/"]);
    let discoverer = PeriodDiscoverer::new(Arc::new(server), &config);

    let err = discoverer.discover_top_periods(3).await.unwrap_err();
    assert!(matches!(err, PipelineError::Discovery { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn discovery_fails_when_a_year_listing_is_unreachable() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let server = FakeHttp::default()
        .page(ROOT, &["demonstracoes_contabeis/"])
        .page(CATEGORY, &["2023/", "2024/"])
        .page(&format!("{CATEGORY}2024/"), &["1T2024.zip"]);
    let discoverer = PeriodDiscoverer::new(Arc::new(server), &config);

    let err = discoverer.discover_top_periods(3).await.unwrap_err();
    assert!(matches!(err, PipelineError::Discovery { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn one_failing_period_does_not_stop_the_others() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let retriever = ArchiveRetriever::new(Arc::new(regulator_server()), &config);
    let periods = vec![
        ReportingPeriod::new(2024, 1, format!("{CATEGORY}2024/1T2024.zip")),
        ReportingPeriod::new(2023, 4, format!("{CATEGORY}2023/4T2023.zip")),
        ReportingPeriod::new(2023, 3, format!("{CATEGORY}2023/3T2023.zip")),
    ];

    let outcome = retriever.retrieve_and_extract(&periods).await?;

    assert_eq!(outcome.diagnostics.succeeded, 2);
    assert_eq!(outcome.diagnostics.failed, 1);
    let mut names: Vec<String> = outcome
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["1T2024.csv", "4T2023.csv"]);
    assert!(outcome.files.iter().all(|f| f.path.exists()));
    Ok(())
}

#[tokio::test]
async fn period_folder_is_searched_for_its_archive() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let folder = format!("{CATEGORY}2022/3T2022/");
    let server = FakeHttp::default()
        .page(&folder, &["leia-me.txt", "3T2022.zip"])
        .blob(
            &format!("{folder}3T2022.zip"),
            zip_archive(&[("3T2022.csv", expense_file(&[]))]),
        );
    let retriever = ArchiveRetriever::new(Arc::new(server), &config);

    let outcome = retriever
        .retrieve_and_extract(&[ReportingPeriod::new(2022, 3, folder)])
        .await?;
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.diagnostics.failed, 0);
    Ok(())
}

#[tokio::test]
async fn missing_catalog_is_fatal() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let loader = ReferenceCatalogLoader::new(Arc::new(FakeHttp::default()), &config);

    let err = loader.load_catalog().await.unwrap_err();
    assert!(matches!(err, PipelineError::CatalogLoad { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn catalog_keys_are_digit_normalized() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let loader = ReferenceCatalogLoader::new(Arc::new(regulator_server()), &config);

    let catalog = loader.load_catalog().await?;
    assert_eq!(catalog.len(), 2);
    let operator = catalog.get("123.456").expect("normalized lookup");
    assert_eq!(operator.legal_name, "OPERADORA SAÚDE LTDA");
    assert_eq!(operator.region, "SP");
    Ok(())
}

#[tokio::test]
async fn full_run_enriches_and_writes_every_expense_row() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let pipeline = Pipeline::new(config, Arc::new(regulator_server()));

    let mut sink = MemorySink::default();
    let summary = pipeline.run(&mut sink).await?;

    assert_eq!(summary.periods.len(), 3);
    assert_eq!(summary.files_extracted, 2);
    assert_eq!(summary.retrieval.failed, 1);
    assert_eq!(summary.operators_loaded, 2);
    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.enrichment.matched, 2);
    assert_eq!(summary.enrichment.unmatched, 1);
    assert_eq!(sink.operators.len(), 2);

    let records = &sink.expenses;
    assert!(records.iter().all(|r| r.account_code.starts_with('4')));
    let by_account = |code: &str| {
        records
            .iter()
            .find(|r| r.account_code == code)
            .unwrap_or_else(|| panic!("no record with account {code}"))
    };

    let q4 = by_account("4");
    assert_eq!((q4.year, q4.quarter), (2023, 4));
    assert_eq!(q4.amount, Decimal::ZERO);
    assert_eq!(q4.counterparty_name, "COOPERATIVA NORTE");
    assert_eq!(q4.registry_id, "55666777000188");

    let matched = by_account("41111");
    assert_eq!((matched.year, matched.quarter), (2024, 1));
    assert_eq!(matched.amount, Decimal::from_str("1234.56")?);
    assert_eq!(matched.counterparty_name, "OPERADORA SAÚDE LTDA");
    assert_eq!(matched.registry_id, "11.222.333/0001-44");
    assert_eq!(matched.region.as_deref(), Some("SP"));

    let unmatched = by_account("411");
    assert_eq!(unmatched.registry_id, "777777");
    assert_eq!(unmatched.counterparty_name, OPERATOR_NOT_FOUND);
    assert_eq!(unmatched.amount, Decimal::from_str("10.5")?);
    Ok(())
}

#[tokio::test]
async fn full_run_writes_the_consolidated_file() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let output = config.output_path.clone();
    let pipeline = Pipeline::new(config, Arc::new(regulator_server()));

    let mut sink = CsvFileSink::new(&output);
    let summary = pipeline.run(&mut sink).await?;
    assert_eq!(summary.records_written, 3);

    let content = std::fs::read_to_string(&output)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Identifier;CounterpartyName;Quarter;Year;Amount");
    assert!(lines.contains(&"11.222.333/0001-44;OPERADORA SAÚDE LTDA;1;2024;1234.56"));
    assert!(lines.contains(&format!("777777;{OPERATOR_NOT_FOUND};1;2024;10.5").as_str()));
    Ok(())
}

#[tokio::test]
async fn catalog_failure_aborts_the_run() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let mut server = regulator_server();
    server.blobs.remove(CATALOG);
    let pipeline = Pipeline::new(config, Arc::new(server));

    let mut sink = MemorySink::default();
    let err = pipeline.run(&mut sink).await.unwrap_err();
    assert!(matches!(err, PipelineError::CatalogLoad { .. }), "got {err:?}");
    assert!(sink.expenses.is_empty());
    Ok(())
}

fn files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .flat_map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                files_under(&path)
            } else {
                vec![path]
            }
        })
        .collect()
}

#[tokio::test]
async fn failed_catalog_stops_downloads_still_in_flight() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let staging = config.staging_dir.clone();
    let extracted = config.extract_dir.clone();

    let mut server = regulator_server()
        .slow(CATALOG, Duration::from_millis(100))
        .slow(&format!("{CATEGORY}2024/1T2024.zip"), Duration::from_millis(300))
        .slow(&format!("{CATEGORY}2023/4T2023.zip"), Duration::from_millis(300));
    server.blobs.remove(CATALOG);
    let pipeline = Pipeline::new(config, Arc::new(server));

    let mut sink = MemorySink::default();
    let err = pipeline.run(&mut sink).await.unwrap_err();
    assert!(matches!(err, PipelineError::CatalogLoad { .. }), "got {err:?}");

    // Well past the archive latency: nothing may land once the run has failed
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(files_under(&extracted).is_empty(), "extracted after failure: {:?}", files_under(&extracted));
    assert!(files_under(&staging).is_empty(), "downloaded after failure: {:?}", files_under(&staging));
    Ok(())
}

#[tokio::test]
async fn archives_with_the_same_entry_name_stay_separate() -> Result<()> {
    let workdir = tempdir()?;
    let config = test_config(&workdir);
    let q1 = format!("{CATEGORY}2024/1T2024.zip");
    let q2 = format!("{CATEGORY}2024/2T2024.zip");
    let server = FakeHttp::default()
        .blob(&q1, zip_archive(&[("dados.csv", expense_file(&["x;1;41;a;0;1,00"]))]))
        .blob(&q2, zip_archive(&[("dados.csv", expense_file(&["x;2;41;a;0;2,00"]))]));
    let retriever = ArchiveRetriever::new(Arc::new(server), &config);

    let outcome = retriever
        .retrieve_and_extract(&[ReportingPeriod::new(2024, 2, q2), ReportingPeriod::new(2024, 1, q1)])
        .await?;

    assert_eq!(outcome.files.len(), 2);
    assert_ne!(outcome.files[0].path, outcome.files[1].path);
    assert_eq!(outcome.files[0].period.quarter, 2);
    assert!(std::fs::read_to_string(&outcome.files[0].path)?.contains("2,00"));
    assert!(std::fs::read_to_string(&outcome.files[1].path)?.contains("1,00"));
    Ok(())
}
