//! 新建记录的候选数据与必填字段校验
//!
//! 候选数据保持表单的原始文本形式，只有通过校验后才会转换成待插入的行。
//! 行中不包含 `id`，由远程存储分配。

use crate::error::ValidationError;
use crate::models::{
    CareLocation, ExamStatus, Row, Severity, TreatmentPhase, TreatmentStatus,
};
use crate::utils::format_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

/// 候选记录
pub trait RecordDraft {
    /// 校验必填字段与枚举取值，不产生任何副作用
    fn validate(&self) -> Result<(), ValidationError>;

    /// 以给定日期生成待插入的行
    fn to_row(&self, date: NaiveDate) -> Result<Row, ValidationError>;
}

/// 可选枚举字段：空白时使用默认值，否则必须是合法字面量
fn parse_or_default<T: FromStr>(
    errors: &mut ValidationError,
    field: &'static str,
    value: &str,
    default: T,
) -> Option<T> {
    if value.trim().is_empty() {
        return Some(default);
    }
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            errors.reject(field);
            None
        }
    }
}

fn optional_text(value: &Option<String>) -> Value {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Value::String(text.to_string()),
        _ => Value::Null,
    }
}

fn into_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => Row::new(),
    }
}

/// 新治疗记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreatmentDraft {
    pub phase: String,
    pub description: String,
    /// 为空时视为 `Planejado`
    #[serde(default)]
    pub status: String,
}

impl TreatmentDraft {
    fn checked(&self) -> Result<(TreatmentPhase, TreatmentStatus), ValidationError> {
        let mut errors = ValidationError::new();
        errors.require("phase", &self.phase);
        errors.require("description", &self.description);

        let phase = if self.phase.trim().is_empty() {
            None
        } else {
            match TreatmentPhase::from_str(&self.phase) {
                Ok(phase) => Some(phase),
                Err(_) => {
                    errors.reject("phase");
                    None
                }
            }
        };
        let status = parse_or_default(&mut errors, "status", &self.status, TreatmentStatus::Planned);

        match (phase, status) {
            (Some(phase), Some(status)) if errors.is_empty() => Ok((phase, status)),
            _ => Err(errors),
        }
    }
}

impl RecordDraft for TreatmentDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        self.checked().map(|_| ())
    }

    fn to_row(&self, date: NaiveDate) -> Result<Row, ValidationError> {
        let (phase, status) = self.checked()?;
        Ok(into_row(json!({
            "date": format_date(date),
            "phase": phase,
            "description": self.description.trim(),
            "status": status,
        })))
    }
}

/// 新检查记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExamDraft {
    #[serde(rename = "type")]
    pub exam_type: String,
    /// 为空时视为 `solicitado`
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Option<String>,
}

impl ExamDraft {
    fn checked(&self) -> Result<ExamStatus, ValidationError> {
        let mut errors = ValidationError::new();
        errors.require("type", &self.exam_type);
        let status = parse_or_default(&mut errors, "status", &self.status, ExamStatus::Requested);
        errors.into_result()?;
        status.ok_or_else(ValidationError::new)
    }
}

impl RecordDraft for ExamDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        self.checked().map(|_| ())
    }

    fn to_row(&self, date: NaiveDate) -> Result<Row, ValidationError> {
        let status = self.checked()?;
        Ok(into_row(json!({
            "date": format_date(date),
            "type": self.exam_type.trim(),
            "status": status,
            "results": optional_text(&self.results),
        })))
    }
}

/// 新医生处方
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionDraft {
    pub medication: String,
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
}

impl RecordDraft for PrescriptionDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        errors.require("medication", &self.medication);
        errors.require("dosage", &self.dosage);
        errors.into_result()
    }

    fn to_row(&self, date: NaiveDate) -> Result<Row, ValidationError> {
        self.validate()?;
        Ok(into_row(json!({
            "date": format_date(date),
            "medication": self.medication.trim(),
            "dosage": self.dosage.trim(),
            "frequency": self.frequency.trim(),
        })))
    }
}

/// 新护士处方
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NursePrescriptionDraft {
    pub medication: String,
    pub dosage: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RecordDraft for NursePrescriptionDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        errors.require("medication", &self.medication);
        errors.require("dosage", &self.dosage);
        errors.into_result()
    }

    fn to_row(&self, date: NaiveDate) -> Result<Row, ValidationError> {
        self.validate()?;
        Ok(into_row(json!({
            "date": format_date(date),
            "medication": self.medication.trim(),
            "dosage": self.dosage.trim(),
            "duration": self.duration.trim(),
            "reason": optional_text(&self.reason),
        })))
    }
}

/// 患者登记的新副作用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideEffectDraft {
    pub medication: String,
    pub effect: String,
    /// 为空时视为 `leve`
    #[serde(default)]
    pub severity: String,
    /// 为空时视为 `domiciliar`
    #[serde(default)]
    pub location: String,
}

impl SideEffectDraft {
    fn checked(&self) -> Result<(Severity, CareLocation), ValidationError> {
        let mut errors = ValidationError::new();
        errors.require("medication", &self.medication);
        errors.require("effect", &self.effect);
        let severity = parse_or_default(&mut errors, "severity", &self.severity, Severity::Mild);
        let location = parse_or_default(&mut errors, "location", &self.location, CareLocation::Home);

        match (severity, location) {
            (Some(severity), Some(location)) if errors.is_empty() => Ok((severity, location)),
            _ => Err(errors),
        }
    }
}

impl RecordDraft for SideEffectDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        self.checked().map(|_| ())
    }

    fn to_row(&self, date: NaiveDate) -> Result<Row, ValidationError> {
        let (severity, location) = self.checked()?;
        Ok(into_row(json!({
            "date": format_date(date),
            "medication": self.medication.trim(),
            "effect": self.effect.trim(),
            "severity": severity,
            "location": location,
        })))
    }
}
