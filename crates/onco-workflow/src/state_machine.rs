//! 报告状态机
//!
//! 管理患者报告从提交到解决的状态转换：
//! `pendente → em_analise → resolvido` 或 `pendente → resolvido`，不允许回退。

use onco_core::{ReportStatus, TriageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 报告状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReportEvent {
    /// 护士开始分析
    StartAnalysis,
    /// 附加指导并解决
    Resolve,
}

/// 报告状态机
#[derive(Debug)]
pub struct ReportStateMachine {
    transitions: HashMap<(ReportStatus, ReportEvent), ReportStatus>,
}

impl ReportStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((ReportStatus::Pending, ReportEvent::StartAnalysis), ReportStatus::InAnalysis);
        transitions.insert((ReportStatus::InAnalysis, ReportEvent::StartAnalysis), ReportStatus::InAnalysis);
        transitions.insert((ReportStatus::Pending, ReportEvent::Resolve), ReportStatus::Resolved);
        transitions.insert((ReportStatus::InAnalysis, ReportEvent::Resolve), ReportStatus::Resolved);
        // 已解决的报告可以追加指导，但状态保持不变
        transitions.insert((ReportStatus::Resolved, ReportEvent::Resolve), ReportStatus::Resolved);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: ReportStatus, event: ReportEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: ReportStatus, event: ReportEvent) -> Result<ReportStatus, TriageError> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| TriageError::InvalidTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            })
    }

    /// 终止状态：没有任何转换能离开
    pub fn is_terminal(&self, state: ReportStatus) -> bool {
        self.transitions
            .iter()
            .filter(|((from, _), _)| *from == state)
            .all(|(_, to)| *to == state)
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: ReportStatus) -> Vec<ReportEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for ReportStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
