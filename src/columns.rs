// 🏷️ Column Normalizer - raw header labels → canonical labels / ids

use serde::{Deserialize, Serialize};
use std::fmt;

const ACCENT_MAP: &[(char, char)] = &[
    ('Ã', 'A'),
    ('Á', 'A'),
    ('Â', 'A'),
    ('À', 'A'),
    ('Ç', 'C'),
    ('É', 'E'),
    ('Ê', 'E'),
    ('Í', 'I'),
    ('Ó', 'O'),
    ('Õ', 'O'),
    ('Ô', 'O'),
    ('Ú', 'U'),
];

/// Trim, upper-case, strip the accents Portuguese exports use.
///
/// "  Valor Líquido " → "VALOR LIQUIDO"
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .chars()
        .map(|c| {
            ACCENT_MAP
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect()
}

pub fn normalize_labels(raw: &[String]) -> Vec<String> {
    raw.iter().map(|l| normalize_label(l)).collect()
}

/// First label containing any of `keys`, else column 0.
///
/// Used to preselect date/amount columns when the caller does not choose.
pub fn suggest_column(labels: &[String], keys: &[&str]) -> usize {
    labels
        .iter()
        .position(|label| keys.iter().any(|k| label.contains(k)))
        .unwrap_or(0)
}

// ============================================================================
// CANONICAL COLUMNS
// ============================================================================

/// The fixed column set shared with the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalColumn {
    IdPedido,
    DataHora,
    CanalVenda,
    ValorBruto,
    ValorLiquido,
}

impl CanonicalColumn {
    pub const ALL: [CanonicalColumn; 5] = [
        CanonicalColumn::IdPedido,
        CanonicalColumn::DataHora,
        CanonicalColumn::CanalVenda,
        CanonicalColumn::ValorBruto,
        CanonicalColumn::ValorLiquido,
    ];

    /// Column id in the persisted table
    pub fn id(&self) -> &'static str {
        match self {
            CanonicalColumn::IdPedido => "id_pedido",
            CanonicalColumn::DataHora => "data_hora",
            CanonicalColumn::CanalVenda => "canal_venda",
            CanonicalColumn::ValorBruto => "valor_bruto",
            CanonicalColumn::ValorLiquido => "valor_liquido",
        }
    }
}

impl fmt::Display for CanonicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Raw label → canonical id. Lookups go through `normalize_label`, so
/// "Valor Líquido", "VALOR LIQUIDO " and "valor liquido" all hit one entry.
#[derive(Debug, Clone)]
pub struct RenameTable {
    entries: Vec<(String, CanonicalColumn)>,
}

impl RenameTable {
    pub fn new() -> Self {
        RenameTable {
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, raw_label: &str, column: CanonicalColumn) -> Self {
        self.entries.push((normalize_label(raw_label), column));
        self
    }

    pub fn resolve(&self, raw_label: &str) -> Option<CanonicalColumn> {
        let key = normalize_label(raw_label);
        self.entries
            .iter()
            .find(|(label, _)| *label == key)
            .map(|(_, column)| *column)
    }

    /// Position of each canonical column in `headers`; unmapped labels are
    /// dropped, and the first header wins when two map to the same column.
    pub fn map_headers(&self, headers: &[String]) -> ColumnMap {
        let mut map = ColumnMap::default();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(column) = self.resolve(header) {
                if map.get(column).is_none() {
                    map.set(column, idx);
                }
            }
        }
        map
    }
}

impl Default for RenameTable {
    /// Point-of-sale order export labels
    fn default() -> Self {
        RenameTable::new()
            .with("Pedido", CanonicalColumn::IdPedido)
            .with("ID Pedido", CanonicalColumn::IdPedido)
            .with("Data - Hora", CanonicalColumn::DataHora)
            .with("Data/Hora", CanonicalColumn::DataHora)
            .with("Canal de Venda", CanonicalColumn::CanalVenda)
            .with("Canal", CanonicalColumn::CanalVenda)
            .with("Valor Bruto", CanonicalColumn::ValorBruto)
            .with("Valor Líquido", CanonicalColumn::ValorLiquido)
    }
}

/// Where each canonical column sits in a located table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    slots: [Option<usize>; 5],
}

impl ColumnMap {
    fn slot(column: CanonicalColumn) -> usize {
        match column {
            CanonicalColumn::IdPedido => 0,
            CanonicalColumn::DataHora => 1,
            CanonicalColumn::CanalVenda => 2,
            CanonicalColumn::ValorBruto => 3,
            CanonicalColumn::ValorLiquido => 4,
        }
    }

    pub fn get(&self, column: CanonicalColumn) -> Option<usize> {
        self.slots[ColumnMap::slot(column)]
    }

    pub fn set(&mut self, column: CanonicalColumn, idx: usize) {
        self.slots[ColumnMap::slot(column)] = Some(idx);
    }

    pub fn mapped(&self) -> Vec<CanonicalColumn> {
        CanonicalColumn::ALL
            .iter()
            .copied()
            .filter(|c| self.get(*c).is_some())
            .collect()
    }

    /// Cell text for a canonical column, None when unmapped or out of range
    pub fn cell<'a>(&self, row: &'a [String], column: CanonicalColumn) -> Option<&'a str> {
        self.get(column)
            .and_then(|idx| row.get(idx))
            .map(|s| s.as_str())
    }
}
