//! 汇总统计
//!
//! 医生与护士概览所用的纯派生视图。每次从仓库/引擎快照重新计算，不保存状态；
//! 结果与顺序无关，重复出现的同一标识符只计一次。

use onco_core::{
    Exam, ExamStatus, NursePrescription, PatientReport, Prescription, RecordId, ReportStatus,
    Severity, SideEffect, Treatment, TreatmentStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 记录所处的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Resolved,
    /// 无生命周期或既不待处理也未完成（如已暂停的治疗）
    Untracked,
}

/// 可参与汇总的记录
pub trait Lifecycle {
    fn record_id(&self) -> &RecordId;
    fn stage(&self) -> Stage;
}

impl Lifecycle for Treatment {
    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn stage(&self) -> Stage {
        match self.status {
            TreatmentStatus::Planned | TreatmentStatus::InProgress => Stage::Pending,
            TreatmentStatus::Completed => Stage::Resolved,
            TreatmentStatus::Suspended => Stage::Untracked,
        }
    }
}

impl Lifecycle for Exam {
    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn stage(&self) -> Stage {
        match self.status {
            ExamStatus::Requested => Stage::Pending,
            ExamStatus::Performed => Stage::Resolved,
        }
    }
}

impl Lifecycle for Prescription {
    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn stage(&self) -> Stage {
        Stage::Untracked
    }
}

impl Lifecycle for NursePrescription {
    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn stage(&self) -> Stage {
        Stage::Untracked
    }
}

impl Lifecycle for SideEffect {
    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn stage(&self) -> Stage {
        Stage::Untracked
    }
}

impl Lifecycle for PatientReport {
    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn stage(&self) -> Stage {
        match self.status {
            ReportStatus::Pending | ReportStatus::InAnalysis => Stage::Pending,
            ReportStatus::Resolved => Stage::Resolved,
        }
    }
}

/// 单类记录的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub total: usize,
    pub pending: usize,
    pub resolved: usize,
}

impl RecordCounts {
    /// 统计一组记录，重复标识符只计一次
    pub fn of<'a, T, I>(items: I) -> Self
    where
        T: Lifecycle + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut seen = HashSet::new();
        let mut counts = Self::default();

        for item in items {
            if !seen.insert(item.record_id().clone()) {
                continue;
            }
            counts.total += 1;
            match item.stage() {
                Stage::Pending => counts.pending += 1,
                Stage::Resolved => counts.resolved += 1,
                Stage::Untracked => {}
            }
        }

        counts
    }
}

/// 医生端患者概览
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub treatments: RecordCounts,
    pub exams: RecordCounts,
    pub prescriptions: RecordCounts,
    pub nurse_prescriptions: RecordCounts,
    pub side_effects: RecordCounts,
    /// 严重副作用数量
    pub severe_side_effects: usize,
}

impl PatientSummary {
    pub fn compute(
        treatments: &[Treatment],
        exams: &[Exam],
        prescriptions: &[Prescription],
        nurse_prescriptions: &[NursePrescription],
        side_effects: &[SideEffect],
    ) -> Self {
        let mut seen = HashSet::new();
        let severe_side_effects = side_effects
            .iter()
            .filter(|effect| seen.insert(&effect.id))
            .filter(|effect| effect.severity == Severity::Severe)
            .count();

        Self {
            treatments: RecordCounts::of(treatments),
            exams: RecordCounts::of(exams),
            prescriptions: RecordCounts::of(prescriptions),
            nurse_prescriptions: RecordCounts::of(nurse_prescriptions),
            side_effects: RecordCounts::of(side_effects),
            severe_side_effects,
        }
    }
}

/// 护士端分诊概览
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageOverview {
    pub reports: RecordCounts,
    pub in_analysis: usize,
    pub urgent: usize,
    /// 尚未解决的紧急报告
    pub urgent_open: usize,
}

impl TriageOverview {
    pub fn from_reports<'a, I>(reports: I) -> Self
    where
        I: IntoIterator<Item = &'a PatientReport>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<&PatientReport> = reports
            .into_iter()
            .filter(|report| seen.insert(report.id.clone()))
            .collect();

        let urgent: Vec<&&PatientReport> = unique.iter().filter(|r| r.is_urgent()).collect();

        Self {
            reports: RecordCounts::of(unique.iter().copied()),
            in_analysis: unique
                .iter()
                .filter(|r| r.status == ReportStatus::InAnalysis)
                .count(),
            urgent: urgent.len(),
            urgent_open: urgent
                .iter()
                .filter(|r| r.status != ReportStatus::Resolved)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use onco_core::{CareLocation, ReportType, TreatmentPhase};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 1).unwrap()
    }

    fn exam(id: &str, status: ExamStatus) -> Exam {
        Exam {
            id: RecordId::from(id),
            date: day(),
            exam_type: "Hemograma completo".to_string(),
            status,
            results: None,
        }
    }

    #[test]
    fn test_counts_are_order_independent_and_deduplicated() {
        let exams = vec![
            exam("1", ExamStatus::Performed),
            exam("2", ExamStatus::Requested),
            exam("1", ExamStatus::Performed),
        ];
        let mut reversed = exams.clone();
        reversed.reverse();

        let counts = RecordCounts::of(&exams);
        assert_eq!(counts, RecordCounts { total: 2, pending: 1, resolved: 1 });
        assert_eq!(RecordCounts::of(&reversed), counts);
    }

    #[test]
    fn test_patient_summary() {
        let treatments = vec![
            Treatment {
                id: RecordId::from("1"),
                date: day(),
                phase: TreatmentPhase::Chemotherapy,
                description: "Sessão 1 - Protocolo AC".to_string(),
                status: TreatmentStatus::InProgress,
            },
            Treatment {
                id: RecordId::from("2"),
                date: day(),
                phase: TreatmentPhase::Radiotherapy,
                description: "Planejamento inicial".to_string(),
                status: TreatmentStatus::Suspended,
            },
        ];
        let effects = vec![SideEffect {
            id: RecordId::from("7"),
            date: day(),
            medication: "Ondansetrona".to_string(),
            effect: "Vômitos".to_string(),
            severity: Severity::Severe,
            location: CareLocation::Hospital,
        }];

        let summary = PatientSummary::compute(&treatments, &[exam("1", ExamStatus::Requested)], &[], &[], &effects);
        assert_eq!(summary.treatments, RecordCounts { total: 2, pending: 1, resolved: 0 });
        assert_eq!(summary.exams.pending, 1);
        assert_eq!(summary.prescriptions.total, 0);
        assert_eq!(summary.side_effects.total, 1);
        assert_eq!(summary.severe_side_effects, 1);
    }

    #[test]
    fn test_triage_overview() {
        let base = PatientReport {
            id: RecordId::from("1"),
            date: day(),
            report_type: ReportType::Urgent,
            description: "Febre".to_string(),
            medication: None,
            severity: None,
            status: ReportStatus::Pending,
            response: None,
        };
        let resolved = PatientReport {
            id: RecordId::from("2"),
            report_type: ReportType::Question,
            status: ReportStatus::Resolved,
            response: Some("Sim".to_string()),
            ..base.clone()
        };
        let analysing = PatientReport {
            id: RecordId::from("3"),
            report_type: ReportType::SideEffect,
            severity: Some(Severity::Severe),
            status: ReportStatus::InAnalysis,
            ..base.clone()
        };

        let reports = [base.clone(), resolved, analysing, base];
        let overview = TriageOverview::from_reports(&reports);
        assert_eq!(overview.reports, RecordCounts { total: 3, pending: 2, resolved: 1 });
        assert_eq!(overview.in_analysis, 1);
        assert_eq!(overview.urgent, 2);
        assert_eq!(overview.urgent_open, 2);
    }
}
