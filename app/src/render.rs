use assessor_core::model::{Assessment, Job, JobProgress, JobStatus};

pub fn progress_line(progress: &JobProgress) -> String {
    let mut line = format!(
        "[{}/{}] {:>3}% {}",
        progress.step,
        progress.total,
        progress.percent(),
        progress.label
    );
    if let Some(message) = &progress.message {
        line.push_str(": ");
        line.push_str(message);
    }
    line
}

pub fn job_summary(job: &Job) -> String {
    let mut summary = format!("job {} {}", job.id, job.status);
    match job.status {
        JobStatus::Completed => {
            if let Some(assessment_id) = &job.assessment_id {
                summary.push_str(&format!(" -> assessment {assessment_id}"));
            }
        }
        JobStatus::Failed => {
            if let Some(message) = job.failure_message() {
                summary.push_str(&format!(" ({message})"));
            }
        }
        _ => {}
    }
    summary
}

pub fn assessment_table(assessments: &[Assessment]) -> String {
    if assessments.is_empty() {
        return "No assessments yet.".to_string();
    }
    let id_width = assessments
        .iter()
        .map(|assessment| assessment.id.len())
        .max()
        .unwrap_or(2)
        .max(2);
    let mut out = format!("{:<id_width$}  {:<9}  {:<16}  NAME\n", "ID", "SOURCE", "CREATED");
    for assessment in assessments {
        let created = assessment
            .created_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let source = serde_json::to_value(assessment.source_type)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        out.push_str(&format!(
            "{:<id_width$}  {:<9}  {:<16}  {}\n",
            assessment.id, source, created, assessment.name
        ));
    }
    out
}
