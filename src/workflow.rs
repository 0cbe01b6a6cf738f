use std::path::Path;
use std::sync::Arc;

use crate::analysis_client::{AnalysisError, AnalysisResult, BananaClassifier};
use crate::camera_controller::{CameraDevice, CameraSession};
use crate::image_source::ImageArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CameraOpen,
    Preview,
    Analyzing,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    ImageSelected,
    BananaCheck,
    RipenessResult,
}

impl AnalysisStage {
    pub fn all() -> &'static [AnalysisStage] {
        &[
            AnalysisStage::ImageSelected,
            AnalysisStage::BananaCheck,
            AnalysisStage::RipenessResult,
        ]
    }

    pub fn index(&self) -> usize {
        match self {
            AnalysisStage::ImageSelected => 0,
            AnalysisStage::BananaCheck => 1,
            AnalysisStage::RipenessResult => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisStage::ImageSelected => "Image selected",
            AnalysisStage::BananaCheck => "Banana check",
            AnalysisStage::RipenessResult => "Ripeness result",
        }
    }
}

/// An analysis accepted by the workflow, ready to be submitted.
///
/// Carries the generation it started under so a completion arriving after a
/// reset can be recognized as stale and ignored.
pub struct PendingAnalysis {
    pub generation: u64,
    pub image: Vec<u8>,
}

/// The capture/analyze state machine. Sole owner of the workflow state; the
/// camera and classifier are collaborators behind trait seams.
pub struct WorkflowController {
    camera: Arc<dyn CameraDevice>,
    classifier: Arc<dyn BananaClassifier>,
    phase: Phase,
    stage: Option<AnalysisStage>,
    error: Option<String>,
    artifact: Option<ImageArtifact>,
    result: Option<AnalysisResult>,
    busy: bool,
    session: Option<CameraSession>,
    generation: u64,
}

impl WorkflowController {
    pub fn new(camera: Arc<dyn CameraDevice>, classifier: Arc<dyn BananaClassifier>) -> Self {
        Self {
            camera,
            classifier,
            phase: Phase::Idle,
            stage: None,
            error: None,
            artifact: None,
            result: None,
            busy: false,
            session: None,
            generation: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stage(&self) -> Option<AnalysisStage> {
        self.stage
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    /// Path of the live camera preview frame, while the camera is open.
    pub fn session_preview_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.preview_path())
    }

    /// Path of the held artifact's preview image.
    pub fn artifact_preview_path(&self) -> Option<&Path> {
        self.artifact.as_ref().map(|a| a.preview().path())
    }

    pub fn classifier(&self) -> Arc<dyn BananaClassifier> {
        Arc::clone(&self.classifier)
    }

    /// Open the camera. Only valid from Idle; a second open while a session
    /// exists is rejected by the phase guard, so streams never duplicate.
    pub async fn open_camera(&mut self) {
        if self.phase != Phase::Idle || self.busy {
            return;
        }

        self.error = None;
        self.result = None;

        let camera = Arc::clone(&self.camera);
        match camera.open().await {
            Ok(session) => {
                self.session = Some(session);
                self.phase = Phase::CameraOpen;
            }
            Err(e) => {
                log::warn!("Camera open failed: {}", e);
                self.error = Some(e.to_string());
                self.phase = Phase::Idle;
            }
        }
    }

    /// Capture a frame from the open session. Success stores the artifact
    /// and moves to Preview; failure stays in CameraOpen with the session
    /// still running.
    pub async fn capture_photo(&mut self) {
        if self.phase != Phase::CameraOpen {
            return;
        }

        let camera = Arc::clone(&self.camera);
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match camera.capture(session).await {
            Ok(artifact) => {
                // Capture stopped the session; dropping the handle here
                // releases the stale preview file
                self.session = None;
                self.error = None;
                self.result = None;
                self.artifact = Some(artifact);
                self.phase = Phase::Preview;
            }
            Err(e) => {
                log::warn!("Capture failed: {}", e);
                self.error = Some(e.to_string());
            }
        }
    }

    /// Close the camera without capturing.
    pub fn close_camera(&mut self) {
        if self.phase != Phase::CameraOpen {
            return;
        }

        if let Some(mut session) = self.session.take() {
            session.stop();
        }
        self.phase = Phase::Idle;
    }

    /// Store a user-selected file as the held artifact. Superseding an
    /// earlier artifact releases its preview handle.
    pub fn select_file<P: AsRef<Path>>(&mut self, path: P) {
        if self.busy || !matches!(self.phase, Phase::Idle | Phase::Preview) {
            return;
        }

        match ImageArtifact::from_file(path) {
            Ok(artifact) => {
                self.error = None;
                self.result = None;
                self.artifact = Some(artifact);
                self.phase = Phase::Preview;
            }
            Err(e) => {
                log::warn!("File selection failed: {}", e);
                self.error = Some(e.to_string());
            }
        }
    }

    /// Start an analysis. No-op unless an artifact is held and none is in
    /// flight; returns the image payload to submit.
    pub fn begin_analysis(&mut self) -> Option<PendingAnalysis> {
        if self.busy || self.phase != Phase::Preview {
            return None;
        }
        let artifact = self.artifact.as_ref()?;

        self.busy = true;
        self.phase = Phase::Analyzing;
        self.stage = Some(AnalysisStage::ImageSelected);
        self.error = None;
        self.result = None;

        Some(PendingAnalysis {
            generation: self.generation,
            image: artifact.data().to_vec(),
        })
    }

    /// Advance to the banana-check stage once the request is built, just
    /// before the client call.
    pub fn mark_submitted(&mut self, generation: u64) {
        if generation != self.generation || self.phase != Phase::Analyzing {
            return;
        }
        self.stage = Some(AnalysisStage::BananaCheck);
    }

    /// Apply an analysis outcome. Completions from a generation the state
    /// has moved past are ignored, not applied.
    pub fn finish_analysis(
        &mut self,
        generation: u64,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) {
        if generation != self.generation || self.phase != Phase::Analyzing {
            log::debug!("Ignoring stale analysis completion");
            return;
        }

        self.busy = false;
        match outcome {
            Ok(result) => {
                self.stage = Some(AnalysisStage::RipenessResult);
                self.result = Some(result);
                self.phase = Phase::Result;
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.result = None;
                self.stage = None;
                self.phase = Phase::Preview;
            }
        }
    }

    /// Run a full analysis inline: begin, submit, await, apply.
    pub async fn analyze(&mut self) {
        let Some(pending) = self.begin_analysis() else {
            return;
        };
        self.mark_submitted(pending.generation);

        let classifier = Arc::clone(&self.classifier);
        let outcome = classifier.analyze(&pending.image).await;
        self.finish_analysis(pending.generation, outcome);
    }

    /// Return to Idle from any state, releasing everything held.
    pub fn reset(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
        self.artifact = None;
        self.result = None;
        self.error = None;
        self.stage = None;
        self.busy = false;
        self.phase = Phase::Idle;
        // In-flight completions for the old generation become stale
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_client::{Ripeness, Warnings};
    use crate::camera_controller::CameraError;
    use crate::image_source::PreviewHandle;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct ScriptedCamera {
        open_ok: bool,
        capture_ok: bool,
    }

    #[async_trait]
    impl CameraDevice for ScriptedCamera {
        async fn open(&self) -> Result<CameraSession, CameraError> {
            if self.open_ok {
                Ok(CameraSession::new(
                    PathBuf::from("/nonexistent/preview.jpg"),
                    None,
                ))
            } else {
                Err(CameraError::PermissionDenied)
            }
        }

        async fn capture(
            &self,
            session: &mut CameraSession,
        ) -> Result<ImageArtifact, CameraError> {
            if self.capture_ok {
                session.stop();
                Ok(ImageArtifact::new(
                    vec![0xFF, 0xD8, 0x01, 0x02],
                    PreviewHandle::borrowed(PathBuf::from("/nonexistent/capture.jpg")),
                ))
            } else {
                Err(CameraError::CaptureFailed("scripted failure".to_string()))
            }
        }
    }

    enum ScriptedOutcome {
        Banana,
        NotBanana,
        Network,
        Service,
    }

    struct ScriptedClassifier {
        outcome: ScriptedOutcome,
    }

    #[async_trait]
    impl BananaClassifier for ScriptedClassifier {
        async fn analyze(&self, _image: &[u8]) -> Result<AnalysisResult, AnalysisError> {
            match self.outcome {
                ScriptedOutcome::Banana => Ok(AnalysisResult {
                    is_banana: true,
                    ripeness: Some(Ripeness::Ripe),
                    confidence: 0.87,
                    banana_confidence: 0.95,
                    warnings: Warnings::default(),
                }),
                ScriptedOutcome::NotBanana => Ok(AnalysisResult {
                    is_banana: false,
                    ripeness: None,
                    confidence: 0.0,
                    banana_confidence: 0.3,
                    warnings: Warnings {
                        too_dark: true,
                        too_blurry: false,
                    },
                }),
                ScriptedOutcome::Network => {
                    Err(AnalysisError::Network("connection refused".to_string()))
                }
                ScriptedOutcome::Service => {
                    Err(AnalysisError::Service("image too small".to_string()))
                }
            }
        }
    }

    fn controller(camera: ScriptedCamera, outcome: ScriptedOutcome) -> WorkflowController {
        WorkflowController::new(
            Arc::new(camera),
            Arc::new(ScriptedClassifier { outcome }),
        )
    }

    fn write_test_image(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("banana.jpg");
        std::fs::write(&path, b"jpeg bytes").unwrap();
        path
    }

    /// At most one of {camera session, in-flight analysis} at any instant.
    fn assert_exclusive(workflow: &WorkflowController) {
        assert!(!(workflow.has_session() && workflow.busy()));
    }

    #[tokio::test]
    async fn test_scenario_a_open_then_capture() {
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.open_camera().await;
        assert_eq!(workflow.phase(), Phase::CameraOpen);
        assert!(workflow.has_session());
        assert_exclusive(&workflow);

        workflow.capture_photo().await;
        assert_eq!(workflow.phase(), Phase::Preview);
        assert!(workflow.has_artifact());
        assert!(!workflow.has_session());
        assert!(workflow.error().is_none());
    }

    #[tokio::test]
    async fn test_scenario_b_not_a_banana_is_a_result() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::NotBanana,
        );

        workflow.select_file(write_test_image(&temp_dir));
        assert_eq!(workflow.phase(), Phase::Preview);

        workflow.analyze().await;
        assert_eq!(workflow.phase(), Phase::Result);
        let result = workflow.result().unwrap();
        assert!(!result.is_banana);
        assert!(result.warnings.too_dark);
        assert!(workflow.error().is_none());
    }

    #[tokio::test]
    async fn test_scenario_c_transport_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Network,
        );

        workflow.select_file(write_test_image(&temp_dir));
        workflow.analyze().await;

        assert_eq!(workflow.phase(), Phase::Preview);
        assert_eq!(workflow.error(), Some("Failed to analyze image."));
        assert!(workflow.result().is_none());
        assert!(workflow.stage().is_none());
        assert!(!workflow.busy());
    }

    #[tokio::test]
    async fn test_scenario_d_ripe_banana() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.select_file(write_test_image(&temp_dir));
        workflow.analyze().await;

        assert_eq!(workflow.phase(), Phase::Result);
        let result = workflow.result().unwrap();
        assert!(result.is_banana);
        assert_eq!(result.ripeness, Some(Ripeness::Ripe));
        assert_eq!(result.confidence_percent(), 87);
    }

    #[tokio::test]
    async fn test_scenario_e_permission_denied() {
        let mut workflow = controller(
            ScriptedCamera { open_ok: false, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.open_camera().await;
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(workflow.error().is_some());
        assert!(!workflow.has_session());
    }

    #[tokio::test]
    async fn test_service_rejection_message() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Service,
        );

        workflow.select_file(write_test_image(&temp_dir));
        workflow.analyze().await;

        assert_eq!(workflow.phase(), Phase::Preview);
        assert_eq!(workflow.error(), Some("image too small"));
    }

    #[tokio::test]
    async fn test_capture_failure_keeps_session() {
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: false },
            ScriptedOutcome::Banana,
        );

        workflow.open_camera().await;
        workflow.capture_photo().await;

        assert_eq!(workflow.phase(), Phase::CameraOpen);
        assert!(workflow.error().is_some());
        assert!(workflow.has_session());
        assert!(!workflow.has_artifact());
    }

    #[tokio::test]
    async fn test_close_camera() {
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.open_camera().await;
        workflow.close_camera();
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(!workflow.has_session());

        // Closing with no session is a no-op
        workflow.close_camera();
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_open_camera_rejected_outside_idle() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.select_file(write_test_image(&temp_dir));
        workflow.open_camera().await;

        assert_eq!(workflow.phase(), Phase::Preview);
        assert!(!workflow.has_session());
    }

    #[tokio::test]
    async fn test_analyze_is_noop_without_artifact() {
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.analyze().await;
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(!workflow.busy());
        assert!(workflow.stage().is_none());
        assert!(workflow.result().is_none());
    }

    #[tokio::test]
    async fn test_analyze_is_noop_while_busy() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.select_file(write_test_image(&temp_dir));
        let pending = workflow.begin_analysis().unwrap();
        assert!(workflow.busy());

        // A second analysis while one is in flight is rejected
        assert!(workflow.begin_analysis().is_none());
        assert_eq!(workflow.phase(), Phase::Analyzing);
        assert_exclusive(&workflow);

        workflow.finish_analysis(
            pending.generation,
            Ok(AnalysisResult {
                is_banana: true,
                ripeness: Some(Ripeness::Green),
                confidence: 0.6,
                banana_confidence: 0.9,
                warnings: Warnings::default(),
            }),
        );
        assert_eq!(workflow.phase(), Phase::Result);
    }

    #[tokio::test]
    async fn test_stage_sequence_on_success() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.select_file(write_test_image(&temp_dir));

        let mut observed = Vec::new();
        let pending = workflow.begin_analysis().unwrap();
        observed.push(workflow.stage().unwrap().index());

        workflow.mark_submitted(pending.generation);
        observed.push(workflow.stage().unwrap().index());

        workflow.finish_analysis(
            pending.generation,
            Ok(AnalysisResult {
                is_banana: true,
                ripeness: Some(Ripeness::Turning),
                confidence: 0.7,
                banana_confidence: 0.9,
                warnings: Warnings::default(),
            }),
        );
        observed.push(workflow.stage().unwrap().index());

        assert_eq!(observed, vec![0, 1, 2]);
        assert_eq!(workflow.phase(), Phase::Result);
    }

    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.select_file(write_test_image(&temp_dir));
        let pending = workflow.begin_analysis().unwrap();
        let stale_generation = pending.generation;

        // Reset while the analysis is in flight
        workflow.reset();
        assert_eq!(workflow.phase(), Phase::Idle);

        // The late completion is delivered into a state that no longer
        // expects it and must be ignored
        workflow.finish_analysis(
            stale_generation,
            Ok(AnalysisResult {
                is_banana: true,
                ripeness: Some(Ripeness::Ripe),
                confidence: 0.9,
                banana_confidence: 0.9,
                warnings: Warnings::default(),
            }),
        );

        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(workflow.result().is_none());
        assert!(!workflow.busy());
    }

    #[tokio::test]
    async fn test_stale_completion_after_new_analysis_started() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        workflow.select_file(write_test_image(&temp_dir));
        let first = workflow.begin_analysis().unwrap();

        workflow.reset();
        workflow.select_file(write_test_image(&temp_dir));
        let second = workflow.begin_analysis().unwrap();
        assert_ne!(first.generation, second.generation);

        // The first run's completion must not finish the second run
        workflow.finish_analysis(
            first.generation,
            Err(AnalysisError::Network("late".to_string())),
        );
        assert_eq!(workflow.phase(), Phase::Analyzing);
        assert!(workflow.busy());
    }

    #[tokio::test]
    async fn test_select_file_supersedes_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        let first = write_test_image(&temp_dir);
        let second = temp_dir.path().join("other.jpg");
        std::fs::write(&second, b"other bytes").unwrap();

        workflow.select_file(&first);
        workflow.select_file(&second);

        assert_eq!(workflow.phase(), Phase::Preview);
        assert_eq!(workflow.artifact_preview_path(), Some(second.as_path()));
    }

    #[tokio::test]
    async fn test_select_file_is_noop_while_busy() {
        let temp_dir = TempDir::new().unwrap();
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );

        let first = write_test_image(&temp_dir);
        workflow.select_file(&first);
        workflow.begin_analysis().unwrap();

        let second = temp_dir.path().join("other.jpg");
        std::fs::write(&second, b"other bytes").unwrap();
        workflow.select_file(&second);

        assert_eq!(workflow.phase(), Phase::Analyzing);
        assert_eq!(workflow.artifact_preview_path(), Some(first.as_path()));
    }

    #[tokio::test]
    async fn test_reset_from_every_phase() {
        let temp_dir = TempDir::new().unwrap();

        // From CameraOpen
        let mut workflow = controller(
            ScriptedCamera { open_ok: true, capture_ok: true },
            ScriptedOutcome::Banana,
        );
        workflow.open_camera().await;
        workflow.reset();
        assert_reset_state(&workflow);

        // From Preview
        workflow.select_file(write_test_image(&temp_dir));
        workflow.reset();
        assert_reset_state(&workflow);

        // From Analyzing
        workflow.select_file(write_test_image(&temp_dir));
        workflow.begin_analysis().unwrap();
        workflow.reset();
        assert_reset_state(&workflow);

        // From Result
        workflow.select_file(write_test_image(&temp_dir));
        workflow.analyze().await;
        assert_eq!(workflow.phase(), Phase::Result);
        workflow.reset();
        assert_reset_state(&workflow);
    }

    fn assert_reset_state(workflow: &WorkflowController) {
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(!workflow.has_artifact());
        assert!(workflow.result().is_none());
        assert!(workflow.error().is_none());
        assert!(workflow.stage().is_none());
        assert!(!workflow.busy());
        assert!(!workflow.has_session());
    }

    #[test]
    fn test_stage_labels_and_order() {
        let stages = AnalysisStage::all();
        assert_eq!(stages.len(), 3);
        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert!(!stage.label().is_empty());
        }
    }
}
