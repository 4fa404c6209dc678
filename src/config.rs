//! Spreadsheet catalogue and column vocabulary
//!
//! Every sheet name, numeric sheet id and column header the workflows rely on
//! lives here, loaded from YAML with production defaults for anything omitted.

use crate::error::{ArmoryError, ArmoryResult};
use crate::types::SheetRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_SPREADSHEET_ID: &str = "1I-4WiQHDkBjPWA2r2Oa4QBS0Nspj_Iy6NmJUCrTiHSY";
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmoryConfig {
    pub spreadsheet_id: String,
    pub api_base: String,
    pub userinfo_url: String,

    /// Per-company roster tabs
    pub units: Vec<SheetRef>,
    pub weapon_inventory: SheetRef,
    pub optics_inventory: SheetRef,
    pub defect_log: SheetRef,
    pub signoff_summary: SheetRef,
    pub audit_log: SheetRef,
    pub permissions: SheetRef,
    /// Per-company logistics request tabs
    pub logistics: Vec<SheetRef>,
    /// Quantity sign/credit tabs
    pub equipment: Vec<SheetRef>,

    pub roster_columns: RosterColumns,
    pub logistics_columns: LogisticsColumns,
    pub equipment_columns: EquipmentColumns,
    pub signoff_columns: SignoffColumns,

    /// Optic types tracked through the shared scope column instead of their own column
    pub scope_types: Vec<String>,
    /// Optic types reported in the accessories table
    pub accessory_types: Vec<String>,
    /// Permission key that may edit status and read flags
    pub logistics_role: String,
    /// Permission key of company staff ordering on behalf of their company
    pub company_role: String,

    pub token_cache: Option<PathBuf>,
}

impl Default for ArmoryConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: DEFAULT_SPREADSHEET_ID.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            userinfo_url: DEFAULT_USERINFO_URL.to_string(),
            units: vec![
                SheetRef::new("פלוגה א", "א", 1473439552),
                SheetRef::new("פלוגה ב", "ב", 834345156),
                SheetRef::new("פלוגה ג", "ג", 1155932191),
                SheetRef::new("מסייעת", "מסייעת", 1438187158),
                SheetRef::new("אלון", "אלון", 579384803),
                SheetRef::new("מכלול", "מכלול", 557813363),
                SheetRef::new("פלס״ם", "פלסם", 414499990),
            ],
            weapon_inventory: SheetRef::new("מלאי נשקיה", "מלאי נשקיה", 439908422),
            optics_inventory: SheetRef::new("מלאי אופטיקה", "מלאי אופטיקה", 813181890),
            defect_log: SheetRef::new("תקול לסדנא", "תקול לסדנא", 2142875489),
            signoff_summary: SheetRef::new("טבלת נשקיה", "טבלת נשקיה", 714814830),
            audit_log: SheetRef::new("תיעוד", "תיעוד", 553027487),
            permissions: SheetRef::new("הרשאות", "הרשאות", 1029384756),
            logistics: Vec::new(),
            equipment: Vec::new(),
            roster_columns: RosterColumns::default(),
            logistics_columns: LogisticsColumns::default(),
            equipment_columns: EquipmentColumns::default(),
            signoff_columns: SignoffColumns::default(),
            scope_types: vec!["M5".to_string(), "מפרו".to_string(), "מאפרו".to_string()],
            accessory_types: vec![
                "PEQ".to_string(),
                "פנס נשק".to_string(),
                "משקפת".to_string(),
                "ידית קדמית".to_string(),
            ],
            logistics_role: "Logistic".to_string(),
            company_role: "Plugot".to_string(),
            token_cache: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterColumns {
    pub full_name: String,
    pub weapon_type: String,
    pub serial: String,
    /// Scope type of the soldier's scope
    pub scope: String,
    pub scope_serial: String,
    pub comment: String,
    pub signed_at: String,
    /// Comment value marking a weapon as stored in the armory
    pub stored_marker: String,
}

impl Default for RosterColumns {
    fn default() -> Self {
        Self {
            full_name: "שם מלא".to_string(),
            weapon_type: "סוג נשק".to_string(),
            serial: "מסד".to_string(),
            scope: "כוונת".to_string(),
            scope_serial: "מסד כוונת".to_string(),
            comment: "הערות".to_string(),
            signed_at: "זמן חתימה".to_string(),
            stored_marker: "מאופסן".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticsColumns {
    pub date: String,
    pub catalog: String,
    pub item: String,
    pub size: String,
    pub quantity: String,
    pub purpose: String,
    pub note: String,
    pub status: String,
    pub user: String,
    pub read: String,
    pub signature: String,
    pub signer: String,
    pub row_id: String,
}

impl Default for LogisticsColumns {
    fn default() -> Self {
        Self {
            date: "תאריך".to_string(),
            catalog: "מק\"ט".to_string(),
            item: "פריט".to_string(),
            size: "מידה".to_string(),
            quantity: "כמות".to_string(),
            purpose: "צורך".to_string(),
            note: "הערה".to_string(),
            status: "סטטוס".to_string(),
            user: "משתמש".to_string(),
            read: "נקרא".to_string(),
            signature: "חתימה".to_string(),
            signer: "שם החותם".to_string(),
            row_id: "מזהה".to_string(),
        }
    }
}

impl LogisticsColumns {
    /// Header written to a fresh logistics tab
    pub fn header(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.catalog.clone(),
            self.item.clone(),
            self.size.clone(),
            self.quantity.clone(),
            self.purpose.clone(),
            self.note.clone(),
            self.status.clone(),
            self.user.clone(),
            self.read.clone(),
            self.signature.clone(),
            self.signer.clone(),
            self.row_id.clone(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipmentColumns {
    pub item: String,
    pub quantity: String,
    pub signer: String,
    pub issuer: String,
    pub time: String,
}

impl Default for EquipmentColumns {
    fn default() -> Self {
        Self {
            item: "פריט".to_string(),
            quantity: "כמות".to_string(),
            signer: "חייל חותם".to_string(),
            issuer: "חייל מחתים".to_string(),
            time: "זמן ביצוע".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignoffColumns {
    pub item: String,
    pub signed: String,
}

impl Default for SignoffColumns {
    fn default() -> Self {
        Self {
            item: "שם אמצעי".to_string(),
            signed: "חתימה".to_string(),
        }
    }
}

impl ArmoryConfig {
    /// Load a YAML config; keys that are absent keep their defaults.
    pub fn load(path: &Path) -> ArmoryResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ArmoryConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use the built-in catalogue.
    pub fn load_or_default(path: Option<&Path>) -> ArmoryResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> ArmoryResult<()> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(ArmoryError::Config("spreadsheet_id is empty".to_string()));
        }

        let mut ids = HashSet::new();
        let mut ranges = HashSet::new();
        for sheet in self.all_sheets() {
            if !ids.insert(sheet.id) {
                return Err(ArmoryError::Config(format!(
                    "sheet id {} is used by more than one sheet",
                    sheet.id
                )));
            }
            if !ranges.insert(sheet.range.as_str()) {
                return Err(ArmoryError::Config(format!(
                    "range '{}' is used by more than one sheet",
                    sheet.range
                )));
            }
        }
        Ok(())
    }

    pub fn all_sheets(&self) -> impl Iterator<Item = &SheetRef> {
        self.units
            .iter()
            .chain([
                &self.weapon_inventory,
                &self.optics_inventory,
                &self.defect_log,
                &self.signoff_summary,
                &self.audit_log,
                &self.permissions,
            ])
            .chain(self.logistics.iter())
            .chain(self.equipment.iter())
    }

    pub fn sheet(&self, range: &str) -> ArmoryResult<&SheetRef> {
        self.all_sheets()
            .find(|s| s.range == range || s.name == range)
            .ok_or_else(|| ArmoryError::NotFound(format!("sheet '{}'", range)))
    }

    pub fn unit(&self, range: &str) -> ArmoryResult<&SheetRef> {
        self.units
            .iter()
            .find(|s| s.range == range || s.name == range)
            .ok_or_else(|| ArmoryError::NotFound(format!("unit '{}'", range)))
    }

    pub fn logistics_sheet(&self, range: &str) -> ArmoryResult<&SheetRef> {
        self.logistics
            .iter()
            .find(|s| s.range == range || s.name == range)
            .ok_or_else(|| ArmoryError::NotFound(format!("logistics sheet '{}'", range)))
    }

    pub fn equipment_sheet(&self, range: &str) -> ArmoryResult<&SheetRef> {
        self.equipment
            .iter()
            .find(|s| s.range == range || s.name == range)
            .ok_or_else(|| ArmoryError::NotFound(format!("equipment sheet '{}'", range)))
    }

    pub fn is_scope_type(&self, item_type: &str) -> bool {
        self.scope_types.iter().any(|t| t == item_type)
    }

    pub fn is_accessory(&self, item_type: &str) -> bool {
        self.accessory_types.iter().any(|t| t == item_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() {
        let config = ArmoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.units.len(), 7);
        assert_eq!(config.scope_types.len(), 3);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
spreadsheet_id: "abc"
logistics:
  - {{ name: "לוגיסטיקה א", range: "לוגיסטיקה א", id: 11 }}
"#
        )
        .unwrap();

        let config = ArmoryConfig::load(file.path()).unwrap();
        assert_eq!(config.spreadsheet_id, "abc");
        assert_eq!(config.logistics.len(), 1);
        assert_eq!(config.audit_log.id, 553027487);
        assert_eq!(config.roster_columns.weapon_type, "סוג נשק");
    }

    #[test]
    fn test_duplicate_sheet_id_rejected() {
        let mut config = ArmoryConfig::default();
        config.logistics.push(SheetRef::new("x", "x", 553027487));
        assert!(matches!(config.validate(), Err(ArmoryError::Config(_))));
    }

    #[test]
    fn test_lookup_by_name_or_range() {
        let config = ArmoryConfig::default();
        assert_eq!(config.unit("פלוגה א").unwrap().range, "א");
        assert_eq!(config.unit("פלסם").unwrap().id, 414499990);
        assert!(config.unit("ד").is_err());
    }
}
