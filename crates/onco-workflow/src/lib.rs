//! # Onco工作流模块
//!
//! 肿瘤患者随访的核心业务逻辑，包括：
//! - 报告状态机：管理患者报告的生命周期
//! - 分诊引擎：报告提交、紧急识别与护理指导
//! - 记录仓库：经持久化网关读写临床记录的本地缓存
//! - 汇总统计：医生与护士视角的计数
//! - 患者日程：用药打卡与预约提醒

pub mod archive;
pub mod repository;
pub mod schedule;
pub mod state_machine;
pub mod summary;
pub mod triage;

// 重新导出主要类型
pub use archive::TriageArchive;
pub use repository::{
    ExamRepository, NursePrescriptionRepository, PrescriptionRepository, Repositories,
    Repository, SideEffectRepository, TreatmentRepository, DEFAULT_REQUEST_TIMEOUT,
};
pub use schedule::{
    MedicationDose, MedicationSchedule, Procedure, ProcedureAgenda, ScheduleError,
    UpcomingProcedure, DEFAULT_UPCOMING_WINDOW_DAYS,
};
pub use state_machine::{ReportEvent, ReportStateMachine};
pub use summary::{Lifecycle, PatientSummary, RecordCounts, Stage, TriageOverview};
pub use triage::{ReportDraft, TriageEngine};
