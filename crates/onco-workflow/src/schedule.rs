//! 患者日程
//!
//! 用药打卡与即将进行的检查/治疗安排。日程只在本地维护，不经过持久化网关。
//! 距离天数总是由日期推导，不存储。

use chrono::{NaiveDate, NaiveTime};
use onco_core::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// 默认提醒窗口（天）
pub const DEFAULT_UPCOMING_WINDOW_DAYS: i64 = 7;

/// 日程错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("用药记录未找到: {0}")]
    UnknownDose(Uuid),

    #[error("无效的服药时间: {0:?}")]
    InvalidTime(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// 单次用药
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationDose {
    pub id: Uuid,
    pub name: String,
    pub dosage: String,
    pub time: NaiveTime,
    pub taken: bool,
    pub date: NaiveDate,
}

/// 用药日程
#[derive(Debug, Default)]
pub struct MedicationSchedule {
    doses: Vec<MedicationDose>,
}

impl MedicationSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一次用药，`time` 为 `HH:MM`
    pub fn add_dose(
        &mut self,
        name: &str,
        dosage: &str,
        time: &str,
        date: NaiveDate,
    ) -> Result<MedicationDose, ScheduleError> {
        let mut errors = ValidationError::new();
        errors.require("name", name);
        errors.require("dosage", dosage);
        errors.into_result()?;

        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map_err(|_| ScheduleError::InvalidTime(time.to_string()))?;

        let dose = MedicationDose {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            dosage: dosage.trim().to_string(),
            time,
            taken: false,
            date,
        };
        self.doses.push(dose.clone());
        Ok(dose)
    }

    /// 切换服药状态，返回新状态
    pub fn toggle_taken(&mut self, dose_id: Uuid) -> Result<bool, ScheduleError> {
        let dose = self
            .doses
            .iter_mut()
            .find(|dose| dose.id == dose_id)
            .ok_or(ScheduleError::UnknownDose(dose_id))?;

        dose.taken = !dose.taken;
        info!("Dose {} of {} marked taken={}", dose.id, dose.name, dose.taken);
        Ok(dose.taken)
    }

    /// 指定日期的用药，按时间排序
    pub fn for_date(&self, date: NaiveDate) -> Vec<&MedicationDose> {
        let mut doses: Vec<&MedicationDose> =
            self.doses.iter().filter(|dose| dose.date == date).collect();
        doses.sort_by_key(|dose| dose.time);
        doses
    }

    /// 指定日期已服用的次数
    pub fn taken_count(&self, date: NaiveDate) -> usize {
        self.for_date(date).iter().filter(|dose| dose.taken).count()
    }

    /// 指定日期尚未服用的次数
    pub fn remaining_count(&self, date: NaiveDate) -> usize {
        self.for_date(date).iter().filter(|dose| !dose.taken).count()
    }
}

/// 预约的检查或治疗
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Uuid,
    pub date: NaiveDate,
    pub name: String,
    /// 准备事项
    pub preparation: String,
}

impl Procedure {
    /// 距离给定日期的天数，已过去为负数
    pub fn days_until(&self, today: NaiveDate) -> i64 {
        (self.date - today).num_days()
    }
}

/// 即将进行的预约
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingProcedure<'a> {
    pub procedure: &'a Procedure,
    pub days_until: i64,
}

/// 预约日程
#[derive(Debug, Default)]
pub struct ProcedureAgenda {
    procedures: Vec<Procedure>,
}

impl ProcedureAgenda {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_procedure(
        &mut self,
        name: &str,
        preparation: &str,
        date: NaiveDate,
    ) -> Result<Procedure, ScheduleError> {
        let mut errors = ValidationError::new();
        errors.require("name", name);
        errors.into_result()?;

        let procedure = Procedure {
            id: Uuid::new_v4(),
            date,
            name: name.trim().to_string(),
            preparation: preparation.trim().to_string(),
        };
        self.procedures.push(procedure.clone());
        Ok(procedure)
    }

    pub fn all(&self) -> &[Procedure] {
        &self.procedures
    }

    /// 今天起 `window_days` 天内（含）的预约，按日期排序，不含已过去的
    pub fn upcoming(&self, today: NaiveDate, window_days: i64) -> Vec<UpcomingProcedure<'_>> {
        let mut upcoming: Vec<UpcomingProcedure<'_>> = self
            .procedures
            .iter()
            .map(|procedure| UpcomingProcedure {
                procedure,
                days_until: procedure.days_until(today),
            })
            .filter(|item| (0..=window_days).contains(&item.days_until))
            .collect();
        upcoming.sort_by_key(|item| item.days_until);
        upcoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 7).unwrap()
    }

    #[test]
    fn test_toggle_and_counts() {
        let mut schedule = MedicationSchedule::new();
        let morning = schedule.add_dose("Ondansetrona", "8mg", "08:00", today()).unwrap();
        schedule.add_dose("Ondansetrona", "8mg", "16:00", today()).unwrap();
        schedule
            .add_dose("Dexametasona", "4mg", "20:00", today() + Duration::days(1))
            .unwrap();

        assert!(schedule.toggle_taken(morning.id).unwrap());
        assert_eq!(schedule.taken_count(today()), 1);
        assert_eq!(schedule.remaining_count(today()), 1);

        assert!(!schedule.toggle_taken(morning.id).unwrap());
        assert_eq!(schedule.taken_count(today()), 0);
    }

    #[test]
    fn test_doses_sorted_by_time() {
        let mut schedule = MedicationSchedule::new();
        schedule.add_dose("Dexametasona", "4mg", "20:00", today()).unwrap();
        schedule.add_dose("Dexametasona", "4mg", "08:00", today()).unwrap();

        let times: Vec<String> = schedule
            .for_date(today())
            .iter()
            .map(|dose| dose.time.format("%H:%M").to_string())
            .collect();
        assert_eq!(times, vec!["08:00", "20:00"]);
    }

    #[test]
    fn test_dose_errors() {
        let mut schedule = MedicationSchedule::new();
        assert!(matches!(
            schedule.add_dose("Ondansetrona", "8mg", "8h", today()),
            Err(ScheduleError::InvalidTime(_))
        ));
        assert!(matches!(
            schedule.add_dose("", "8mg", "08:00", today()),
            Err(ScheduleError::Validation(_))
        ));

        let missing = Uuid::new_v4();
        assert_eq!(
            schedule.toggle_taken(missing),
            Err(ScheduleError::UnknownDose(missing))
        );
    }

    #[test]
    fn test_upcoming_window() {
        let mut agenda = ProcedureAgenda::new();
        agenda
            .add_procedure("Sessão de Quimioterapia", "Chegar 30 min antes.", today() + Duration::days(15))
            .unwrap();
        agenda
            .add_procedure("Consulta Oncologista", "Levar exames anteriores.", today() + Duration::days(7))
            .unwrap();
        agenda
            .add_procedure("Tomografia de Tórax", "Jejum de 4 horas.", today() + Duration::days(3))
            .unwrap();
        agenda
            .add_procedure("Hemograma", "", today() - Duration::days(1))
            .unwrap();

        let upcoming = agenda.upcoming(today(), DEFAULT_UPCOMING_WINDOW_DAYS);
        let names: Vec<(&str, i64)> = upcoming
            .iter()
            .map(|item| (item.procedure.name.as_str(), item.days_until))
            .collect();
        assert_eq!(names, vec![("Tomografia de Tórax", 3), ("Consulta Oncologista", 7)]);
    }
}
