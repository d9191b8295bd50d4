//! 核心数据模型定义
//!
//! 所有记录都是按值替换的不可变对象，状态、严重程度等字段使用封闭枚举，
//! 序列化为与远程数据表一致的葡萄牙语字面量。

use crate::error::StoreError;
use crate::drafts::{
    ExamDraft, NursePrescriptionDraft, PrescriptionDraft, RecordDraft, SideEffectDraft,
    TreatmentDraft,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// 远程数据表的一行
pub type Row = serde_json::Map<String, serde_json::Value>;

/// 记录标识符
///
/// 本地生成时为递增的毫秒时间戳，写入远程存储后由存储分配（可能为整数）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // 存储可能返回字符串或整数主键
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => RecordId(text),
            RawId::Signed(n) => RecordId(n.to_string()),
            RawId::Unsigned(n) => RecordId(n.to_string()),
        })
    }
}

/// 无法识别的枚举字面量
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("无效的{kind}取值: {value:?}")]
pub struct UnknownLiteral {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! literal_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $lit:tt),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $lit)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $lit,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownLiteral;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim() {
                    $($lit => Ok($name::$variant),)+
                    other => Err(UnknownLiteral {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

literal_enum! {
    /// 治疗阶段
    TreatmentPhase {
        Radiotherapy => "Radioterapia",
        Chemotherapy => "Quimioterapia",
        Immunotherapy => "Imunoterapia",
        HormoneTherapy => "Hormonioterapia",
        Surgery => "Cirurgia",
        FollowUp => "Acompanhamento",
    }
}

literal_enum! {
    /// 治疗状态
    TreatmentStatus {
        Planned => "Planejado",
        InProgress => "Em andamento",
        Completed => "Concluído",
        Suspended => "Suspenso",
    }
}

literal_enum! {
    /// 检查状态
    ExamStatus {
        Requested => "solicitado",
        Performed => "realizado",
    }
}

literal_enum! {
    /// 副作用严重程度
    Severity {
        Mild => "leve",
        Moderate => "moderado",
        Severe => "grave",
    }
}

literal_enum! {
    /// 副作用发生地点
    CareLocation {
        Home => "domiciliar",
        Hospital => "hospitalar",
    }
}

literal_enum! {
    /// 患者报告类型
    ReportType {
        SideEffect => "efeito_colateral",
        Question => "duvida",
        Urgent => "urgente",
    }
}

literal_enum! {
    /// 患者报告状态，声明顺序即生命周期顺序
    ReportStatus {
        Pending => "pendente",
        InAnalysis => "em_analise",
        Resolved => "resolvido",
    }
}

literal_enum! {
    /// 护理建议
    Recommendation {
        HospitalVisit => "visita_hospital",
        HomeTreatment => "tratamento_domiciliar",
        FollowUp => "acompanhamento",
    }
}

/// 可由记录仓库管理的记录类型
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// 对应的远程数据表
    const TABLE: &'static str;

    /// 新建记录时提交的候选数据
    type Draft: RecordDraft + Send + Sync;

    fn id(&self) -> &RecordId;

    /// 从存储返回的行解码
    fn from_row(row: Row) -> Result<Self, StoreError> {
        serde_json::from_value(serde_json::Value::Object(row))
            .map_err(|e| StoreError::Decode(format!("{}: {}", Self::TABLE, e)))
    }
}

/// 治疗记录（医生创建）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub id: RecordId,
    pub date: NaiveDate,
    pub phase: TreatmentPhase,
    pub description: String,
    pub status: TreatmentStatus,
}

/// 检查记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: RecordId,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub exam_type: String,
    pub status: ExamStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
}

/// 医生处方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: RecordId,
    pub date: NaiveDate,
    pub medication: String,
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
}

/// 护士处方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NursePrescription {
    pub id: RecordId,
    pub date: NaiveDate,
    pub medication: String,
    pub dosage: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// 患者登记的副作用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffect {
    pub id: RecordId,
    pub date: NaiveDate,
    pub medication: String,
    pub effect: String,
    pub severity: Severity,
    pub location: CareLocation,
}

/// 患者报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientReport {
    pub id: RecordId,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl PatientReport {
    /// 紧急报告：类型为紧急或严重程度为严重。始终由当前字段推导，不存储。
    pub fn is_urgent(&self) -> bool {
        self.report_type == ReportType::Urgent || self.severity == Some(Severity::Severe)
    }
}

/// 护士针对报告给出的指导
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub id: RecordId,
    pub date: NaiveDate,
    /// 非拥有的报告引用
    pub report_id: RecordId,
    pub recommendation: Recommendation,
    pub instructions: String,
}

impl Record for Treatment {
    const TABLE: &'static str = "treatments";
    type Draft = TreatmentDraft;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl Record for Exam {
    const TABLE: &'static str = "exams";
    type Draft = ExamDraft;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl Record for Prescription {
    const TABLE: &'static str = "prescriptions";
    type Draft = PrescriptionDraft;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl Record for NursePrescription {
    const TABLE: &'static str = "nurse_prescriptions";
    type Draft = NursePrescriptionDraft;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl Record for SideEffect {
    const TABLE: &'static str = "side_effects";
    type Draft = SideEffectDraft;

    fn id(&self) -> &RecordId {
        &self.id
    }
}
