//! 报告分诊引擎
//!
//! 持有患者报告与护理指导的权威内存集合，执行报告状态机并推导紧急/待处理视图。
//! 报告按标识符存储，指导只保存报告的键，解析失败时返回 `UnknownReport`。

use crate::state_machine::{ReportEvent, ReportStateMachine};
use crate::summary::TriageOverview;
use onco_core::utils::{today, IdGenerator};
use onco_core::{
    Guidance, PatientReport, Recommendation, RecordId, ReportStatus, ReportType, Severity,
    SideEffect, TriageError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 患者提交的新报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub description: String,
    #[serde(default)]
    pub medication: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// 分诊引擎
#[derive(Debug)]
pub struct TriageEngine {
    state_machine: ReportStateMachine,
    reports: HashMap<RecordId, PatientReport>,
    /// 提交顺序（最早在前）
    submission_order: Vec<RecordId>,
    guidances: Vec<Guidance>,
    ids: IdGenerator,
}

impl TriageEngine {
    /// 创建空的分诊引擎
    pub fn new() -> Self {
        Self {
            state_machine: ReportStateMachine::new(),
            reports: HashMap::new(),
            submission_order: Vec::new(),
            guidances: Vec::new(),
            ids: IdGenerator::new(),
        }
    }

    /// 从已有数据构建引擎
    ///
    /// `reports` 按提交顺序排列（最早在前）。数据必须满足解决不变量：
    /// 报告已解决当且仅当存在非空指导引用它，且回复等于最近一条指导的说明。
    pub fn seed(reports: Vec<PatientReport>, guidances: Vec<Guidance>) -> Result<Self, TriageError> {
        let mut engine = Self::new();

        for report in reports {
            if engine.reports.contains_key(&report.id) {
                return Err(TriageError::InconsistentSeed(format!("duplicate report {}", report.id)));
            }
            engine.ids.observe(&report.id);
            engine.submission_order.push(report.id.clone());
            engine.reports.insert(report.id.clone(), report);
        }

        for guidance in &guidances {
            if !engine.reports.contains_key(&guidance.report_id) {
                return Err(TriageError::InconsistentSeed(format!(
                    "guidance {} references unknown report {}",
                    guidance.id, guidance.report_id
                )));
            }
            if guidance.instructions.trim().is_empty() {
                return Err(TriageError::InconsistentSeed(format!(
                    "guidance {} has empty instructions",
                    guidance.id
                )));
            }
            engine.ids.observe(&guidance.id);
        }
        engine.guidances = guidances;

        for report in engine.reports.values() {
            let latest = engine
                .guidances
                .iter()
                .rev()
                .find(|g| g.report_id == report.id);

            match (report.status, latest) {
                (ReportStatus::Resolved, Some(guidance))
                    if report.response.as_deref() == Some(guidance.instructions.as_str()) => {}
                (ReportStatus::Pending | ReportStatus::InAnalysis, None) if report.response.is_none() => {}
                _ => {
                    return Err(TriageError::InconsistentSeed(format!(
                        "report {} ({}) does not match its guidance history",
                        report.id, report.status
                    )));
                }
            }
        }

        info!(
            "Triage engine seeded with {} reports and {} guidances",
            engine.reports.len(),
            engine.guidances.len()
        );
        Ok(engine)
    }

    /// 提交新报告
    pub fn submit_report(&mut self, draft: ReportDraft) -> Result<PatientReport, TriageError> {
        let description = draft.description.trim();
        if description.is_empty() {
            return Err(TriageError::EmptyDescription);
        }

        let report = PatientReport {
            id: self.ids.next_id().ok_or(TriageError::IdsExhausted)?,
            date: today(),
            report_type: draft.report_type,
            description: description.to_string(),
            medication: draft
                .medication
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            severity: draft.severity,
            status: ReportStatus::Pending,
            response: None,
        };

        if report.is_urgent() {
            warn!("Urgent report {} submitted: {}", report.id, report.description);
        } else {
            info!("Report {} submitted ({})", report.id, report.report_type);
        }

        self.submission_order.push(report.id.clone());
        self.reports.insert(report.id.clone(), report.clone());
        Ok(report)
    }

    /// 将患者登记的副作用转为待分诊的报告
    pub fn report_from_side_effect(&mut self, effect: &SideEffect) -> Result<PatientReport, TriageError> {
        self.submit_report(ReportDraft {
            report_type: ReportType::SideEffect,
            description: effect.effect.clone(),
            medication: Some(effect.medication.clone()),
            severity: Some(effect.severity),
        })
    }

    /// 获取报告
    pub fn get_report(&self, report_id: &RecordId) -> Option<&PatientReport> {
        self.reports.get(report_id)
    }

    /// 所有报告，最新提交在前
    pub fn list_reports(&self) -> Vec<&PatientReport> {
        self.submission_order
            .iter()
            .rev()
            .filter_map(|id| self.reports.get(id))
            .collect()
    }

    /// 紧急报告
    pub fn list_urgent(&self) -> Vec<&PatientReport> {
        self.list_reports()
            .into_iter()
            .filter(|report| report.is_urgent())
            .collect()
    }

    /// 待处理报告
    pub fn list_pending(&self) -> Vec<&PatientReport> {
        self.list_reports()
            .into_iter()
            .filter(|report| report.status == ReportStatus::Pending)
            .collect()
    }

    /// 标记报告为分析中
    pub fn mark_in_analysis(&mut self, report_id: &RecordId) -> Result<(), TriageError> {
        let report = self
            .reports
            .get_mut(report_id)
            .ok_or_else(|| TriageError::UnknownReport(report_id.to_string()))?;

        let next = self
            .state_machine
            .transition(report.status, ReportEvent::StartAnalysis)?;
        if next != report.status {
            info!("Report {} status updated from {} to {}", report_id, report.status, next);
            report.status = next;
        }
        Ok(())
    }

    /// 提交护理指导并解决报告
    ///
    /// 新指导写入日志的同时，报告状态变为已解决并记录回复。
    /// 两处修改在同一次可变借用内完成，读取方不会看到中间状态。
    pub fn submit_guidance(
        &mut self,
        report_id: &RecordId,
        recommendation: Recommendation,
        instructions: &str,
    ) -> Result<Guidance, TriageError> {
        let instructions = instructions.trim();
        if instructions.is_empty() {
            return Err(TriageError::EmptyInstructions);
        }

        let current = self
            .reports
            .get(report_id)
            .map(|report| report.status)
            .ok_or_else(|| TriageError::UnknownReport(report_id.to_string()))?;
        let next = self.state_machine.transition(current, ReportEvent::Resolve)?;

        let guidance = Guidance {
            id: self.ids.next_id().ok_or(TriageError::IdsExhausted)?,
            date: today(),
            report_id: report_id.clone(),
            recommendation,
            instructions: instructions.to_string(),
        };

        if let Some(report) = self.reports.get_mut(report_id) {
            report.status = next;
            report.response = Some(guidance.instructions.clone());
        }
        self.guidances.push(guidance.clone());

        info!(
            "Guidance {} ({}) resolved report {}",
            guidance.id, guidance.recommendation, report_id
        );
        Ok(guidance)
    }

    /// 报告的指导历史（提交顺序）
    pub fn find_guidance_history(&self, report_id: &RecordId) -> Vec<&Guidance> {
        self.guidances
            .iter()
            .filter(|guidance| &guidance.report_id == report_id)
            .collect()
    }

    /// 全部指导日志
    pub fn guidances(&self) -> &[Guidance] {
        &self.guidances
    }

    /// 分诊概览
    pub fn overview(&self) -> TriageOverview {
        debug!("Computing triage overview over {} reports", self.reports.len());
        TriageOverview::from_reports(self.reports.values())
    }

    /// 获取状态机实例
    pub fn state_machine(&self) -> &ReportStateMachine {
        &self.state_machine
    }
}

impl Default for TriageEngine {
    fn default() -> Self {
        Self::new()
    }
}
