//! Shared domain types.
//!
//! Column names, table names and labels here are part of the persisted
//! warehouse layout, so they keep the Portuguese spelling used by the source
//! files and by every consumer of `warehouse.db`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Date column (ISO `YYYY-MM-DD`, first day of the month).
pub const DATE_COLUMN: &str = "Data";
/// Canonical city label column.
pub const CITY_COLUMN: &str = "Cidade";
/// Brazilian state code column.
pub const UF_COLUMN: &str = "UF";
/// Market label column (`Locação` / `Venda`).
pub const MARKET_COLUMN: &str = "TipoMercado";
/// Default target metric: average price per square metre.
pub const PRICE_COLUMN: &str = "Preço médio (R$/m²)Total";

/// Indicator name column of the macro table.
pub const INDICATOR_COLUMN: &str = "Indicador";
/// Statistic columns of the macro table, in persisted order.
pub const INDICATOR_STATS: [&str; 5] = ["Media", "Mediana", "DesvioPadrao", "Minimo", "Maximo"];
/// Statistic used when reshaping indicators to wide form.
pub const INDICATOR_MEAN: &str = "Media";

/// Rental vs sale market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    #[value(alias = "locacao")]
    Rental,
    #[value(alias = "venda", alias = "vendas")]
    Sale,
}

impl MarketType {
    pub const ALL: [MarketType; 2] = [MarketType::Rental, MarketType::Sale];

    /// Warehouse table holding this market.
    pub fn table(self) -> Table {
        match self {
            MarketType::Rental => Table::Rental,
            MarketType::Sale => Table::Sale,
        }
    }

    /// Token used in source file names (`dados_{kind}_{city}_tratado.csv`).
    pub fn file_kind(self) -> &'static str {
        match self {
            MarketType::Rental => "locacao",
            MarketType::Sale => "vendas",
        }
    }

    /// Label stored in `TipoMercado`.
    pub fn label(self) -> &'static str {
        match self {
            MarketType::Rental => "Locação",
            MarketType::Sale => "Venda",
        }
    }

    /// Parse a bundle/market key (`locacao`, `aluguel`, `venda`, ...).
    pub fn from_key(key: &str) -> Option<Self> {
        match slugify(key).as_str() {
            "locacao" | "aluguel" | "rental" | "rent" => Some(MarketType::Rental),
            "venda" | "vendas" | "sale" | "sales" => Some(MarketType::Sale),
            _ => None,
        }
    }
}

/// The nine capitals covered by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum City {
    Aracaju,
    Fortaleza,
    JoaoPessoa,
    Maceio,
    Natal,
    Recife,
    Salvador,
    SaoLuis,
    Teresina,
}

impl City {
    /// Fixed build order.
    pub const ALL: [City; 9] = [
        City::Aracaju,
        City::Fortaleza,
        City::JoaoPessoa,
        City::Maceio,
        City::Natal,
        City::Recife,
        City::Salvador,
        City::SaoLuis,
        City::Teresina,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            City::Aracaju => "aracaju",
            City::Fortaleza => "fortaleza",
            City::JoaoPessoa => "joao_pessoa",
            City::Maceio => "maceio",
            City::Natal => "natal",
            City::Recife => "recife",
            City::Salvador => "salvador",
            City::SaoLuis => "sao_luis",
            City::Teresina => "teresina",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            City::Aracaju => "Aracaju",
            City::Fortaleza => "Fortaleza",
            City::JoaoPessoa => "João Pessoa",
            City::Maceio => "Maceió",
            City::Natal => "Natal",
            City::Recife => "Recife",
            City::Salvador => "Salvador",
            City::SaoLuis => "São Luís",
            City::Teresina => "Teresina",
        }
    }

    /// State code stored in `UF`.
    pub fn uf(self) -> &'static str {
        match self {
            City::Aracaju => "SE",
            City::Fortaleza => "CE",
            City::JoaoPessoa => "PB",
            City::Maceio => "AL",
            City::Natal => "RN",
            City::Recife => "PE",
            City::Salvador => "BA",
            City::SaoLuis => "MA",
            City::Teresina => "PI",
        }
    }

    /// Accepts slugs or labels, ignoring case and accents.
    pub fn from_key(key: &str) -> Option<Self> {
        let slug = slugify(key);
        City::ALL.into_iter().find(|c| c.slug() == slug)
    }

    /// Resolve a stored label back to a city, if it is one of the nine.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::from_key(label)
    }
}

impl std::fmt::Display for City {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Warehouse tables the crate reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Rental,
    Sale,
    /// Macro indicators, long format.
    Indicators,
    /// Macro indicators, one column per indicator (mean statistic).
    IndicatorsWide,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Rental => "locacao",
            Table::Sale => "vendas",
            Table::Indicators => "bcb",
            Table::IndicatorsWide => "bcb_wide",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Model family requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    Prophet,
    #[value(alias = "sarima", alias = "sarimax")]
    Arima,
    #[value(alias = "rf")]
    RandomForest,
    #[value(alias = "xgb")]
    Xgboost,
    ElasticNet,
}

impl ModelFamily {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelFamily::Prophet => "Prophet",
            ModelFamily::Arima => "ARIMA",
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::Xgboost => "XGBoost",
            ModelFamily::ElasticNet => "ElasticNet",
        }
    }

    /// Command-line / bundle spelling.
    pub fn key(self) -> &'static str {
        match self {
            ModelFamily::Prophet => "prophet",
            ModelFamily::Arima => "arima",
            ModelFamily::RandomForest => "random-forest",
            ModelFamily::Xgboost => "xgboost",
            ModelFamily::ElasticNet => "elastic-net",
        }
    }

    /// Parse a bundle key naming a family.
    pub fn from_key(key: &str) -> Option<Self> {
        match slugify(key).replace('_', "").as_str() {
            "prophet" => Some(ModelFamily::Prophet),
            "arima" | "sarima" | "sarimax" => Some(ModelFamily::Arima),
            "randomforest" | "rf" => Some(ModelFamily::RandomForest),
            "xgboost" | "xgb" => Some(ModelFamily::Xgboost),
            "elasticnet" | "enet" => Some(ModelFamily::ElasticNet),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How exogenous values are filled for dates where they are unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    /// Unknown values become 0.
    Zero,
    /// Carry the last known value forward.
    #[value(alias = "forward")]
    Ffill,
}

/// Lowercase ASCII slug: accents folded, runs of separators collapsed to `_`.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_sep = false;
    for ch in s.trim().chars() {
        let folded = match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
            'ç' | 'Ç' => 'c',
            c => c.to_ascii_lowercase(),
        };
        if folded.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(folded);
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_accents_and_separators() {
        assert_eq!(slugify("João Pessoa"), "joao_pessoa");
        assert_eq!(slugify("  São-Luís "), "sao_luis");
        assert_eq!(slugify("Locação"), "locacao");
    }

    #[test]
    fn city_from_key_accepts_labels_and_slugs() {
        assert_eq!(City::from_key("joao_pessoa"), Some(City::JoaoPessoa));
        assert_eq!(City::from_key("MACEIÓ"), Some(City::Maceio));
        assert_eq!(City::from_key("Curitiba"), None);
    }

    #[test]
    fn market_and_family_keys() {
        assert_eq!(MarketType::from_key("Locação"), Some(MarketType::Rental));
        assert_eq!(MarketType::from_key("vendas"), Some(MarketType::Sale));
        assert_eq!(ModelFamily::from_key("SARIMA"), Some(ModelFamily::Arima));
        assert_eq!(ModelFamily::from_key("random_forest"), Some(ModelFamily::RandomForest));
        assert_eq!(ModelFamily::from_key("lstm"), None);
    }
}
