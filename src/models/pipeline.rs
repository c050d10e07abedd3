//! Two-stage risk classification pipeline

use crate::error::{Handle, PipelineError};
use crate::feature_extractor::FeatureExtractor;
use crate::models::loader::ModelHandles;
use crate::types::assessment::{format_probability, DiseaseStatus, RiskAssessment, RiskLevel};
use crate::types::record::ClinicalRecord;
use std::sync::Arc;
use tracing::{debug, warn};

/// Immutable handles and feature layout shared by every classification.
///
/// Built once at startup and shared behind an `Arc`; `classify` takes
/// `&self` and never mutates it.
pub struct PipelineContext {
    extractor: FeatureExtractor,
    handles: ModelHandles,
}

impl PipelineContext {
    pub fn new(extractor: FeatureExtractor, handles: ModelHandles) -> Self {
        Self { extractor, handles }
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Names of the loaded handles
    pub fn loaded_handles(&self) -> Vec<&'static str> {
        self.handles.loaded()
    }

    /// Classify one record.
    ///
    /// Stage A always runs. Stage B runs only when stage A reports high
    /// risk; otherwise the disease status is "N/A" with "0%" probability.
    pub fn classify(&self, record: &ClinicalRecord) -> Result<RiskAssessment, PipelineError> {
        let scaler_a = handle(&self.handles.scaler_a, Handle::ScalerA)?;
        let model_a = handle(&self.handles.model_a, Handle::ModelA)?;

        let features = self.extractor.stage_a(record)?;
        let scaled = scaler_a.transform(&features)?;
        let risk_class = model_a.predict(&scaled)?;
        let risk_level = RiskLevel::from_class_id(risk_class);

        if risk_level == RiskLevel::Unknown {
            warn!(class_id = risk_class, "Stage A returned an unmapped class id");
        }

        if !risk_level.escalates() {
            debug!(risk_level = %risk_level, "Stage A complete, no escalation");
            return Ok(RiskAssessment::stage_a_only(risk_level));
        }

        let (disease_status, disease_probability) = self.classify_disease(record)?;

        debug!(
            risk_level = %risk_level,
            disease_status = %disease_status,
            disease_probability = %disease_probability,
            "Stage B complete"
        );

        Ok(RiskAssessment {
            risk_level,
            disease_status,
            disease_probability,
        })
    }

    fn classify_disease(
        &self,
        record: &ClinicalRecord,
    ) -> Result<(DiseaseStatus, String), PipelineError> {
        let scaler_b = handle(&self.handles.scaler_b, Handle::ScalerB)?;
        let model_b = handle(&self.handles.model_b, Handle::ModelB)?;

        let features = self.extractor.stage_b(record)?;
        let scaled = scaler_b.transform(&features)?;
        let (disease_class, probabilities) = model_b.predict_with_proba(&scaled)?;
        let disease_status = DiseaseStatus::from_class_id(disease_class);

        let probability = usize::try_from(disease_class)
            .ok()
            .and_then(|index| probabilities.get(index).copied());

        let probability = match probability {
            Some(p) => p as f64,
            None => {
                warn!(
                    class_id = disease_class,
                    classes = probabilities.len(),
                    "Stage B class id has no probability entry"
                );
                0.0
            }
        };

        Ok((disease_status, format_probability(probability)))
    }
}

fn handle<T: ?Sized>(slot: &Option<Arc<T>>, which: Handle) -> Result<&T, PipelineError> {
    slot.as_deref()
        .ok_or(PipelineError::ModelUnavailable { handle: which })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::feature_extractor::tests::full_record;
    use crate::feature_extractor::AgeSource;
    use crate::models::classifier::Classifier;
    use crate::models::scaler::{FeatureScaler, StandardScaler};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scaler that passes features through and counts calls
    #[derive(Default)]
    pub(crate) struct SpyScaler {
        pub calls: AtomicUsize,
    }

    impl FeatureScaler for SpyScaler {
        fn transform(&self, features: &[f32]) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(features.to_vec())
        }
    }

    /// Classifier returning a fixed class and recording its inputs
    pub(crate) struct FixedClassifier {
        class_id: i64,
        probabilities: Vec<f32>,
        pub inputs: Mutex<Vec<Vec<f32>>>,
    }

    impl FixedClassifier {
        pub(crate) fn new(class_id: i64, probabilities: Vec<f32>) -> Self {
            Self {
                class_id,
                probabilities,
                inputs: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.inputs.lock().unwrap().len()
        }
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, features: &[f32]) -> anyhow::Result<i64> {
            self.inputs.lock().unwrap().push(features.to_vec());
            Ok(self.class_id)
        }

        fn predict_proba(&self, features: &[f32]) -> anyhow::Result<Vec<f32>> {
            self.inputs.lock().unwrap().push(features.to_vec());
            Ok(self.probabilities.clone())
        }

        fn predict_with_proba(&self, features: &[f32]) -> anyhow::Result<(i64, Vec<f32>)> {
            self.inputs.lock().unwrap().push(features.to_vec());
            Ok((self.class_id, self.probabilities.clone()))
        }
    }

    pub(crate) struct Fixture {
        pub context: PipelineContext,
        pub scaler_b: Arc<SpyScaler>,
        pub model_b: Arc<FixedClassifier>,
    }

    pub(crate) fn fixture(
        stage_a_class: i64,
        stage_b_class: i64,
        stage_b_proba: Vec<f32>,
    ) -> Fixture {
        let scaler_b = Arc::new(SpyScaler::default());
        let model_b = Arc::new(FixedClassifier::new(stage_b_class, stage_b_proba));

        let handles = ModelHandles {
            scaler_a: Some(Arc::new(SpyScaler::default())),
            model_a: Some(Arc::new(FixedClassifier::new(stage_a_class, vec![]))),
            scaler_b: Some(scaler_b.clone()),
            model_b: Some(model_b.clone()),
        };

        Fixture {
            context: PipelineContext::new(FeatureExtractor::new(AgeSource::AgeYrs), handles),
            scaler_b,
            model_b,
        }
    }

    fn vitals_only() -> ClinicalRecord {
        ClinicalRecord::with_vitals(28.0, 110.0, 70.0, 90.0, 37.0, 80.0, 40.0)
    }

    #[test]
    fn test_low_risk_skips_stage_b() {
        let f = fixture(1, 2, vec![0.1, 0.2, 0.7]);

        let result = f.context.classify(&vitals_only()).unwrap();

        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.disease_status, DiseaseStatus::NotApplicable);
        assert_eq!(result.disease_probability, "0%");
        assert_eq!(f.scaler_b.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.model_b.calls(), 0);
    }

    #[test]
    fn test_non_high_labels_never_escalate() {
        for class_id in [1, 2, 5] {
            let f = fixture(class_id, 0, vec![1.0]);
            let result = f.context.classify(&full_record()).unwrap();

            assert_eq!(result.disease_status, DiseaseStatus::NotApplicable);
            assert_eq!(result.disease_probability, "0%");
            assert_eq!(f.model_b.calls(), 0);
        }
    }

    #[test]
    fn test_high_risk_escalates_once() {
        let f = fixture(0, 2, vec![0.2, 0.143, 0.657]);

        let result = f.context.classify(&full_record()).unwrap();

        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.disease_status, DiseaseStatus::Mid);
        assert_eq!(result.disease_probability, "65.7%");
        assert_eq!(f.scaler_b.calls.load(Ordering::SeqCst), 1);

        let inputs = f.model_b.inputs.lock().unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(
            inputs[0],
            vec![3.0, 2.0, 32.0, 29.0, 27.5, 1.0, 1.0, 110.0, 70.0, 10.5, 1.8, 1.0, 9.0]
        );
    }

    #[test]
    fn test_stage_a_receives_fahrenheit() {
        let model_a = Arc::new(FixedClassifier::new(1, vec![]));
        let handles = ModelHandles {
            scaler_a: Some(Arc::new(SpyScaler::default())),
            model_a: Some(model_a.clone()),
            ..ModelHandles::default()
        };
        let context = PipelineContext::new(FeatureExtractor::default(), handles);

        context.classify(&vitals_only()).unwrap();

        let inputs = model_a.inputs.lock().unwrap();
        assert_eq!(inputs[0].len(), 7);
        assert!((inputs[0][4] - 98.6).abs() < 1e-4);
    }

    #[test]
    fn test_probability_rounding() {
        let f = fixture(0, 1, vec![0.1, 0.8342, 0.0658]);
        let result = f.context.classify(&full_record()).unwrap();

        assert_eq!(result.disease_status, DiseaseStatus::Low);
        assert_eq!(result.disease_probability, "83.4%");
    }

    #[test]
    fn test_unmapped_stage_b_class() {
        let f = fixture(0, 5, vec![0.3, 0.3, 0.4]);
        let result = f.context.classify(&full_record()).unwrap();

        assert_eq!(result.disease_status, DiseaseStatus::Unknown);
        assert_eq!(result.disease_probability, "0.0%");
    }

    #[test]
    fn test_missing_stage_b_field_is_an_error() {
        let f = fixture(0, 2, vec![0.2, 0.1, 0.7]);
        let mut record = full_record();
        record.hemoglobin = None;

        let err = f.context.classify(&record).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::InputShape { stage: Stage::B, field: "HB" }
        ));
        assert_eq!(f.model_b.calls(), 0);
    }

    #[test]
    fn test_missing_stage_b_field_is_fine_without_escalation() {
        let f = fixture(2, 2, vec![]);
        let result = f.context.classify(&vitals_only()).unwrap();
        assert_eq!(result.risk_level, RiskLevel::Mid);
    }

    #[test]
    fn test_missing_handles() {
        let context = PipelineContext::new(FeatureExtractor::default(), ModelHandles::default());
        let err = context.classify(&vitals_only()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ModelUnavailable { handle: Handle::ScalerA }
        ));

        let handles = ModelHandles {
            scaler_a: Some(Arc::new(SpyScaler::default())),
            model_a: Some(Arc::new(FixedClassifier::new(0, vec![]))),
            ..ModelHandles::default()
        };
        let context = PipelineContext::new(FeatureExtractor::default(), handles);
        let err = context.classify(&full_record()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ModelUnavailable { handle: Handle::ScalerB }
        ));
    }

    #[test]
    fn test_classify_is_idempotent() {
        let f = fixture(0, 0, vec![0.91, 0.05, 0.04]);
        let record = full_record();

        let first = f.context.classify(&record).unwrap();
        let second = f.context.classify(&record).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.disease_status, DiseaseStatus::High);
        assert_eq!(first.disease_probability, "91.0%");
    }

    #[test]
    fn test_scaler_errors_propagate() {
        let handles = ModelHandles {
            scaler_a: Some(Arc::new(StandardScaler::new(vec![0.0; 3], vec![1.0; 3]).unwrap())),
            model_a: Some(Arc::new(FixedClassifier::new(1, vec![]))),
            ..ModelHandles::default()
        };
        let context = PipelineContext::new(FeatureExtractor::default(), handles);

        let err = context.classify(&vitals_only()).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }

    #[test]
    fn test_context_is_shareable_across_threads() {
        let f = fixture(0, 2, vec![0.2, 0.143, 0.657]);
        let context = Arc::new(f.context);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let context = context.clone();
                std::thread::spawn(move || context.classify(&full_record()).unwrap())
            })
            .collect();

        for worker in workers {
            assert_eq!(worker.join().unwrap().disease_probability, "65.7%");
        }
        assert_eq!(f.model_b.calls(), 4);
    }
}
