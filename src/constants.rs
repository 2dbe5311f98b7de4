//! Source locations and fixed vocabularies used across the pipeline.
//! Anything here that an operator might want to change is also exposed through `Config`.

// Regulator file server
pub const DEFAULT_BASE_URL: &str = "https://dadosabertos.ans.gov.br/FTP/PDA/";
pub const DEFAULT_CATALOG_URL: &str =
    "https://dadosabertos.ans.gov.br/FTP/PDA/operadoras_de_plano_de_saude_ativas/Relatorio_cadop.csv";

// Both fragments must appear in an anchor for it to be the financial statements folder
pub const CATEGORY_KEYWORDS: [&str; 2] = ["demonstraco", "contabeis"];

pub const DEFAULT_PERIOD_COUNT: usize = 3;
pub const DEFAULT_EXPENSE_PREFIX: &str = "4";

pub const DEFAULT_STAGING_DIR: &str = "data/downloads";
pub const DEFAULT_EXTRACT_DIR: &str = "data/extracted";
pub const DEFAULT_OUTPUT_PATH: &str = "output/consolidado_despesas.csv";

// Oldest year token tried when deriving a period from a file name
pub const EARLIEST_YEAR_TOKEN: i32 = 2010;

/// Ordered markers that identify a quarter inside a directory listing entry.
/// Checked quarter by quarter; the first quarter with any matching marker wins.
pub const QUARTER_MARKERS: [(u8, &[&str]); 4] = [
    (1, &["1t", "1º", "1°", "1o trimestre", "q1", "01"]),
    (2, &["2t", "2º", "2°", "2o trimestre", "q2", "02"]),
    (3, &["3t", "3º", "3°", "3o trimestre", "q3", "03"]),
    (4, &["4t", "4º", "4°", "4o trimestre", "q4", "04"]),
];

/// Quarter tokens searched in upper-cased extracted file names.
pub const FILE_QUARTER_TOKENS: [(u8, &str); 4] = [(1, "1T"), (2, "2T"), (3, "3T"), (4, "4T")];

// Archive handling
pub const ARCHIVE_SUFFIX: &str = ".zip";
pub const TABULAR_EXTENSIONS: [&str; 3] = ["csv", "txt", "xlsx"];
pub const DOCUMENTATION_MARKERS: [&str; 2] = ["leiaute", "manual"];
pub const DOCUMENT_EXTENSIONS: [&str; 1] = ["pdf"];

// Expense file header aliases, first match wins
pub const REGISTRY_ID_ALIASES: &[&str] = &["REG_ANS", "CD_OPERADORA", "Registro"];
pub const COUNTERPARTY_ALIASES: &[&str] = &["RAZAO_SOCIAL", "NM_RAZAO_SOCIAL", "Operadora"];
pub const AMOUNT_ALIASES: &[&str] = &["VL_SALDO_FINAL", "VALOR", "Vl_Saldo_Final"];
pub const ACCOUNT_CODE_ALIASES: &[&str] = &["CD_CONTA_CONTABIL", "CD_CONTA", "Conta"];

// Operator catalog header aliases
pub const CATALOG_REGISTRY_ID_ALIASES: &[&str] = &["REGISTRO_OPERADORA", "Registro_ANS", "Registro"];
pub const CATALOG_TAX_ID_ALIASES: &[&str] = &["CNPJ", "Cnpj"];
pub const CATALOG_LEGAL_NAME_ALIASES: &[&str] = &["Razao_Social", "RazaoSocial", "NM_RAZAO_SOCIAL"];
pub const CATALOG_CATEGORY_ALIASES: &[&str] = &["Modalidade", "Descricao_Modalidade"];
pub const CATALOG_REGION_ALIASES: &[&str] = &["UF", "Uf"];

/// Counterparty name given to expense rows whose registry id is not in the catalog
pub const OPERATOR_NOT_FOUND: &str = "OPERADORA NÃO ENCONTRADA";

// Flat-file output
pub const OUTPUT_HEADER: [&str; 5] = ["Identifier", "CounterpartyName", "Quarter", "Year", "Amount"];
pub const OUTPUT_DELIMITER: u8 = b';';

// How many failing examples each stage keeps for its summary
pub const DIAGNOSTIC_SAMPLE_LIMIT: usize = 5;
