//! Column-name reconciliation.
//!
//! Source exports disagree on header spelling (`Data` vs `data_referencia`,
//! `Preço médio (R$/m²) Total` vs `preco_m2`, stray double spaces). This
//! module maps raw headers onto semantic roles and normalizes names before
//! they reach the warehouse.

use std::collections::HashSet;
use std::fmt;

use crate::domain::PRICE_COLUMN;

/// Semantic role a source column can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Date,
    City,
    MarketType,
    Price,
    Indicator,
}

impl Role {
    /// Lowercase candidate names, tried in order (exact pass, then substring pass).
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Role::Date => &["data", "dt", "date", "mes", "periodo", "referencia"],
            Role::City => &["cidade", "municipio", "city"],
            Role::MarketType => &["tipomercado", "tipo_mercado", "mercado", "tipo"],
            Role::Price => &[
                "preço médio (r$/m²)total",
                "preco_m2",
                "preço_m2",
                "valor_m2",
                "preço médio",
                "preco medio",
                "preco",
            ],
            Role::Indicator => &["indicador", "indicator", "serie"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Date => "date",
            Role::City => "city",
            Role::MarketType => "market type",
            Role::Price => "price per m²",
            Role::Indicator => "indicator",
        }
    }
}

/// First column whose lowercase name equals a candidate, else the first whose
/// lowercase name contains one.
pub fn resolve_column<'a, S: AsRef<str>>(columns: &'a [S], candidates: &[&str]) -> Option<&'a str> {
    let lowered: Vec<String> = columns.iter().map(|c| c.as_ref().to_lowercase()).collect();

    for cand in candidates {
        if let Some(i) = lowered.iter().position(|c| c == cand) {
            return Some(columns[i].as_ref());
        }
    }
    for cand in candidates {
        if let Some(i) = lowered.iter().position(|c| c.contains(cand)) {
            return Some(columns[i].as_ref());
        }
    }
    None
}

/// Resolved role → source column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleMap {
    entries: Vec<(Role, String)>,
}

impl RoleMap {
    pub fn get(&self, role: Role) -> Option<&str> {
        self.entries.iter().find(|(r, _)| *r == role).map(|(_, c)| c.as_str())
    }
}

/// Required roles that could not be matched, plus every column that was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedRoles {
    pub missing: Vec<Role>,
    pub columns: Vec<String>,
}

impl fmt::Display for UnresolvedRoles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles: Vec<&str> = self.missing.iter().map(|r| r.label()).collect();
        write!(
            f,
            "could not resolve column(s) for {}; available columns: [{}]",
            roles.join(", "),
            self.columns.join(", ")
        )
    }
}

/// Resolve `required` roles (mandatory) and `optional` roles (best effort).
///
/// A required role never falls back to a guess: if any is missing, the whole
/// mapping is rejected.
pub fn reconcile<S: AsRef<str>>(
    columns: &[S],
    required: &[Role],
    optional: &[Role],
) -> Result<RoleMap, UnresolvedRoles> {
    let mut map = RoleMap::default();
    let mut missing = Vec::new();
    let mut taken: HashSet<String> = HashSet::new();

    for &role in required.iter().chain(optional) {
        // A column claimed by an earlier role is not offered again.
        let free: Vec<&str> = columns
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !taken.contains(*c))
            .collect();
        match resolve_column(&free, role.candidates()) {
            Some(col) => {
                taken.insert(col.to_string());
                map.entries.push((role, col.to_string()));
            }
            None if required.contains(&role) => missing.push(role),
            None => {}
        }
    }

    if missing.is_empty() {
        Ok(map)
    } else {
        Err(UnresolvedRoles {
            missing,
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
        })
    }
}

/// Known duplicate spellings merged onto one canonical header.
const COLUMN_ALIASES: [(&str, &str); 4] = [
    ("Preco medio (R$/m2)Total", PRICE_COLUMN),
    ("Preço Médio (R$/m²)Total", PRICE_COLUMN),
    ("Var. mensal (%)Total", "Var. Mensal (%)Total"),
    ("Variação mensal (%)Total", "Var. Mensal (%)Total"),
];

/// Normalize a raw header: BOM and NBSP removed, whitespace collapsed,
/// `( % )` tightened to `(%)`, ` Total` glued to the preceding word, then
/// the alias table applied.
pub fn clean_column_name(raw: &str) -> String {
    let no_bom = raw.trim_start_matches('\u{feff}').replace('\u{00A0}', " ");
    let collapsed = no_bom.split_whitespace().collect::<Vec<_>>().join(" ");
    let tightened = tighten_percent(&collapsed);
    let glued = glue_total(&tightened);
    let name = glued.trim().to_string();

    COLUMN_ALIASES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| to.to_string())
        .unwrap_or(name)
}

fn tighten_percent(s: &str) -> String {
    // Whitespace is already collapsed, so at most one space sits on each side.
    s.replace("( % )", "(%)").replace("( %)", "(%)").replace("(% )", "(%)")
}

fn glue_total(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find(" Total") {
        let after = &rest[pos + " Total".len()..];
        let at_word_end = after.chars().next().is_none_or(|c| !c.is_alphanumeric());
        out.push_str(&rest[..pos]);
        if at_word_end {
            out.push_str("Total");
        } else {
            out.push_str(" Total");
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Key under which the storage layer would consider two names identical.
pub fn sql_key(name: &str) -> String {
    name.chars()
        .filter(|c| !(c.is_whitespace() || matches!(c, '%' | '(' | ')' | '-' | '/' | '.')))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Indices of columns to keep: the first occurrence per [`sql_key`].
pub fn dedup_columns<S: AsRef<str>>(names: &[S]) -> Vec<usize> {
    let mut seen = HashSet::new();
    names
        .iter()
        .enumerate()
        .filter(|(_, n)| seen.insert(sql_key(n.as_ref())))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_beats_substring() {
        let cols = ["DataVenda", "Data", "Cidade"];
        assert_eq!(resolve_column(&cols, Role::Date.candidates()), Some("Data"));
    }

    #[test]
    fn substring_match_used_when_no_exact_match() {
        let cols = ["DataVenda", "Valor"];
        assert_eq!(resolve_column(&cols, &["data", "dt"]), Some("DataVenda"));
        assert_eq!(resolve_column(&cols, &["cidade"]), None);
    }

    #[test]
    fn price_role_prefers_canonical_header() {
        let cols = ["Data", "Preço médio (R$/m²)Total", "Preço médio (R$/m²)1D"];
        assert_eq!(
            resolve_column(&cols, Role::Price.candidates()),
            Some("Preço médio (R$/m²)Total")
        );
    }

    #[test]
    fn reconcile_reports_all_missing_roles_and_columns() {
        let cols = ["foo", "bar"];
        let err = reconcile(&cols, &[Role::Date, Role::Price], &[Role::City]).unwrap_err();
        assert_eq!(err.missing, vec![Role::Date, Role::Price]);
        assert_eq!(err.columns, vec!["foo", "bar"]);
        let msg = err.to_string();
        assert!(msg.contains("date") && msg.contains("foo") && msg.contains("bar"));
    }

    #[test]
    fn reconcile_does_not_reuse_a_column() {
        let cols = ["Data", "Cidade", "preco_m2"];
        let map = reconcile(&cols, &[Role::Date, Role::Price], &[Role::City, Role::MarketType]).unwrap();
        assert_eq!(map.get(Role::Date), Some("Data"));
        assert_eq!(map.get(Role::Price), Some("preco_m2"));
        assert_eq!(map.get(Role::City), Some("Cidade"));
        assert_eq!(map.get(Role::MarketType), None);
    }

    #[test]
    fn clean_column_name_normalizes_spacing_and_aliases() {
        assert_eq!(clean_column_name("\u{feff}Data"), "Data");
        assert_eq!(clean_column_name("Preço  médio (R$/m²)\u{00A0}Total"), PRICE_COLUMN);
        assert_eq!(clean_column_name("Var. Mensal ( % ) Total"), "Var. Mensal (%)Total");
        assert_eq!(clean_column_name("Variação mensal (%) Total"), "Var. Mensal (%)Total");
        assert_eq!(clean_column_name("Total de anúncios"), "Total de anúncios");
        assert_eq!(clean_column_name("Amostra Totalizada"), "Amostra Totalizada");
    }

    #[test]
    fn dedup_keeps_first_per_sql_key() {
        let names = ["Preço médio (R$/m²)Total", "Preço médio (R$/m²) Total", "Data", "data"];
        assert_eq!(dedup_columns(&names), vec![0, 2]);
        assert_eq!(sql_key("Variação (%) - 12m"), "variação12m");
    }
}
