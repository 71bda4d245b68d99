//! Failure Investigator (spec.md §4.4). Invoked when `batch.failed > 0`;
//! assigns a specific failure reason and produces a user-visible log line
//! per failing container.

use crate::model::{ContainerStateTerminated, JobStatus, PodHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Investigation {
    pub status: JobStatus,
    /// Lines to write to the job's log stream, in order, before persisting
    /// `status`.
    pub log_lines: Vec<String>,
}

pub fn investigate(pods: &[PodHandle]) -> Investigation {
    if pods.iter().any(pod_is_oom) {
        return Investigation {
            status: JobStatus::WorkerOOM,
            log_lines: vec![
                "at least one worker was killed because it ran out of memory".to_owned(),
            ],
        };
    }

    let mut log_lines = Vec::new();
    for pod in pods {
        for container in &pod.containers {
            if let Some(terminated) = container
                .last_termination_state
                .terminated
                .as_ref()
                .or(container.state.terminated.as_ref())
            {
                log_lines.push(format_termination_line(pod, terminated));
            }
        }
    }

    if log_lines.is_empty() {
        log_lines.push("workers were killed for unknown reason".to_owned());
    }

    Investigation {
        status: JobStatus::WorkerError,
        log_lines,
    }
}

fn pod_is_oom(pod: &PodHandle) -> bool {
    pod.containers.iter().any(|c| {
        c.last_termination_state
            .terminated
            .as_ref()
            .map(ContainerStateTerminated::is_oom)
            .unwrap_or(false)
            || c.state
                .terminated
                .as_ref()
                .map(ContainerStateTerminated::is_oom)
                .unwrap_or(false)
    })
}

fn format_termination_line(pod: &PodHandle, terminated: &ContainerStateTerminated) -> String {
    format!(
        "at least one worker had status {} and terminated for reason {} (exit_code={})",
        pod.phase,
        terminated.reason.to_lowercase(),
        terminated.exit_code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerState, ContainerStatus, PodPhase};

    fn terminated_pod(reason: &str, exit_code: i32) -> PodHandle {
        PodHandle {
            name: "worker-0".to_owned(),
            phase: PodPhase::Failed,
            containers: vec![ContainerStatus {
                name: "worker".to_owned(),
                state: ContainerState::default(),
                last_termination_state: ContainerState {
                    terminated: Some(ContainerStateTerminated {
                        exit_code,
                        reason: reason.to_owned(),
                        message: String::new(),
                    }),
                },
            }],
        }
    }

    #[test_log::test]
    fn oom_takes_priority() {
        let pods = vec![terminated_pod("OOMKilled", 137)];
        let investigation = investigate(&pods);
        assert_eq!(investigation.status, JobStatus::WorkerOOM);
        assert_eq!(investigation.log_lines.len(), 1);
        assert!(investigation.log_lines[0].contains("ran out of memory"));
    }

    #[test_log::test]
    fn generic_failure_logs_one_line_per_container() {
        let pods = vec![terminated_pod("Error", 1)];
        let investigation = investigate(&pods);
        assert_eq!(investigation.status, JobStatus::WorkerError);
        assert_eq!(
            investigation.log_lines,
            vec!["at least one worker had status Failed and terminated for reason error (exit_code=1)"
                .to_owned()]
        );
    }

    #[test_log::test]
    fn no_terminated_container_found() {
        let pods = vec![PodHandle {
            name: "worker-0".to_owned(),
            phase: PodPhase::Unknown,
            containers: vec![ContainerStatus {
                name: "worker".to_owned(),
                state: ContainerState::default(),
                last_termination_state: ContainerState::default(),
            }],
        }];
        let investigation = investigate(&pods);
        assert_eq!(investigation.status, JobStatus::WorkerError);
        assert_eq!(
            investigation.log_lines,
            vec!["workers were killed for unknown reason".to_owned()]
        );
    }

    #[test_log::test]
    fn current_state_used_when_last_termination_absent() {
        let mut pod = terminated_pod("Error", 2);
        pod.containers[0].state = pod.containers[0].last_termination_state.clone();
        pod.containers[0].last_termination_state = ContainerState::default();
        let investigation = investigate(&[pod]);
        assert_eq!(investigation.status, JobStatus::WorkerError);
        assert!(investigation.log_lines[0].contains("exit_code=2"));
    }
}
