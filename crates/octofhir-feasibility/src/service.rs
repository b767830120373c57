//! Evaluation of structured queries.
//!
//! Every criterion is expanded into its searches up front. The searches of all
//! criteria are then dispatched together with bounded concurrency, each
//! criterion's results are unioned, and the per-criterion populations are
//! reduced with set algebra:
//!
//! ```text
//! inclusion  = ∩ over groups ( ∪ over criteria in group )
//! exclusion  = ∪ over groups ( ∩ over criteria in group )
//! result     = inclusion \ exclusion
//! ```
//!
//! Every dispatched search runs to completion. If any expansion or search fails
//! the whole evaluation fails with the first error in criterion order.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use indexmap::IndexSet;
use octofhir_core::{DynQueryService, Population, Query};
use serde::Serialize;

use crate::config::EvaluationConfig;
use crate::criterion::Criterion;
use crate::error::Result;
use crate::group::{CriterionGroup, StructuredQuery};
use crate::mapping::MappingContext;

/// The searches one criterion dispatches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedCriterion {
    /// The criterion's contextual concept
    pub concept: String,
    pub queries: Vec<String>,
}

/// The searches of a structured query, in its group structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranslatedQuery {
    pub inclusion: Vec<Vec<TranslatedCriterion>>,
    pub exclusion: Vec<Vec<TranslatedCriterion>>,
}

impl TranslatedQuery {
    pub fn query_count(&self) -> usize {
        self.inclusion
            .iter()
            .chain(&self.exclusion)
            .flatten()
            .map(|c| c.queries.len())
            .sum()
    }
}

pub struct StructuredQueryService {
    query_service: DynQueryService,
    mapping_context: Arc<MappingContext>,
    config: EvaluationConfig,
}

impl StructuredQueryService {
    pub fn new(
        query_service: DynQueryService,
        mapping_context: Arc<MappingContext>,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            query_service,
            mapping_context,
            config,
        }
    }

    pub fn mapping_context(&self) -> &MappingContext {
        &self.mapping_context
    }

    /// Number of patients matching `query`.
    pub async fn execute(&self, query: &StructuredQuery) -> Result<u64> {
        let population = self.execute_population(query).await?;
        Ok(population.len() as u64)
    }

    /// Patients matching `query`.
    pub async fn execute_population(&self, query: &StructuredQuery) -> Result<Population> {
        let inclusion = query.inclusion_criteria.as_slice();
        let exclusion = query
            .exclusion_criteria
            .as_ref()
            .map(|groups| groups.as_slice())
            .unwrap_or_default();

        let criteria: Vec<&Criterion> = inclusion
            .iter()
            .chain(exclusion)
            .flat_map(|group| group.iter())
            .collect();
        let mut populations = self.evaluate(&criteria).await?.into_iter();

        let inclusion_groups: Vec<Vec<Population>> = inclusion
            .iter()
            .map(|group| populations.by_ref().take(group.len()).collect())
            .collect();
        let exclusion_groups: Vec<Vec<Population>> = exclusion
            .iter()
            .map(|group| populations.by_ref().take(group.len()).collect())
            .collect();

        let included = intersect_all(inclusion_groups.iter().map(|group| union_all(group)));
        let excluded = union_all(
            &exclusion_groups
                .iter()
                .map(|group| intersect_all(group.iter().cloned()))
                .collect::<Vec<_>>(),
        );

        let result = included.difference(&excluded);
        tracing::debug!(
            included = included.len(),
            excluded = excluded.len(),
            result = result.len(),
            "Evaluated structured query"
        );
        Ok(result)
    }

    /// Patients matching any of `criteria`. No criteria match nobody.
    pub async fn execute_or(&self, criteria: &[Criterion]) -> Result<Population> {
        let criteria: Vec<&Criterion> = criteria.iter().collect();
        Ok(union_all(&self.evaluate(&criteria).await?))
    }

    /// Patients matching at least one criterion of every group. No groups match nobody.
    pub async fn execute_cnf(&self, groups: &[CriterionGroup<Criterion>]) -> Result<Population> {
        let criteria: Vec<&Criterion> = groups.iter().flat_map(|group| group.iter()).collect();
        let mut populations = self.evaluate(&criteria).await?.into_iter();

        let group_results: Vec<Population> = groups
            .iter()
            .map(|group| union_all(&populations.by_ref().take(group.len()).collect::<Vec<_>>()))
            .collect();
        Ok(intersect_all(group_results.into_iter()))
    }

    /// Render every criterion of `query` into the searches it would dispatch.
    pub fn translate(&self, query: &StructuredQuery) -> Result<TranslatedQuery> {
        translate(&self.mapping_context, query)
    }

    /// One population per criterion, in the given order.
    async fn evaluate(&self, criteria: &[&Criterion]) -> Result<Vec<Population>> {
        let expanded = criteria
            .iter()
            .map(|criterion| criterion_queries(&self.mapping_context, criterion))
            .collect::<Result<Vec<_>>>()?;

        let jobs = expanded.iter().enumerate().flat_map(|(criterion_index, queries)| {
            queries
                .iter()
                .enumerate()
                .map(move |(query_index, query)| (criterion_index, query_index, query))
        });

        let mut results: Vec<_> = stream::iter(jobs)
            .map(|(criterion_index, query_index, query)| async move {
                let result = self.query_service.execute(query, false).await;
                (criterion_index, query_index, result)
            })
            .buffer_unordered(self.config.max_concurrent_queries.max(1))
            .collect()
            .await;
        results.sort_by_key(|(criterion_index, query_index, _)| (*criterion_index, *query_index));

        let mut populations = vec![Population::empty(); criteria.len()];
        for (criterion_index, _, result) in results {
            let population = result?;
            populations[criterion_index] = populations[criterion_index].union(&population);
        }
        Ok(populations)
    }
}

/// Render every criterion of `query` into the searches it would dispatch.
///
/// Needs only the mappings; nothing is sent to a FHIR server.
pub fn translate(ctx: &MappingContext, query: &StructuredQuery) -> Result<TranslatedQuery> {
    type Translated = Vec<Vec<TranslatedCriterion>>;
    let translate_groups = |groups: &[CriterionGroup<Criterion>]| -> Result<Translated> {
        groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|criterion| {
                        Ok(TranslatedCriterion {
                            concept: criterion.contextual_concept().to_string(),
                            queries: criterion_queries(ctx, criterion)?
                                .iter()
                                .map(Query::to_string)
                                .collect(),
                        })
                    })
                    .collect()
            })
            .collect()
    };

    Ok(TranslatedQuery {
        inclusion: translate_groups(&query.inclusion_criteria)?,
        exclusion: match &query.exclusion_criteria {
            Some(groups) => translate_groups(groups)?,
            None => Vec::new(),
        },
    })
}

/// Distinct searches of one criterion, in expansion order.
fn criterion_queries(ctx: &MappingContext, criterion: &Criterion) -> Result<IndexSet<Query>> {
    let expanded = criterion.expand(ctx)?;
    let queries: IndexSet<Query> = expanded.iter().map(|c| c.to_query()).collect();
    tracing::debug!(
        concept = %criterion.contextual_concept(),
        expanded = expanded.len(),
        queries = queries.len(),
        "Expanded criterion"
    );
    Ok(queries)
}

fn union_all(populations: &[Population]) -> Population {
    populations
        .iter()
        .fold(Population::empty(), |acc, population| acc.union(population))
}

/// Intersection of all populations; the empty population when there are none.
fn intersect_all(populations: impl Iterator<Item = Population>) -> Population {
    populations
        .reduce(|acc, population| acc.intersection(&population))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeasibilityError;
    use crate::mapping::Mapping;
    use async_trait::async_trait;
    use octofhir_core::{
        Concept, ContextualConcept, ExecutorError, FhirQueryService, TermCode,
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ICD10: &str = "http://fhir.de/CodeSystem/bfarm/icd-10-gm";

    fn diagnosis() -> TermCode {
        TermCode::new("fdpg.mii.cds", "Diagnose", "Diagnose")
    }

    fn icd10(code: &str) -> TermCode {
        TermCode::new(ICD10, code, "")
    }

    fn criterion(codes: &[&str]) -> Criterion {
        Criterion::concept(ContextualConcept::new(
            diagnosis(),
            Concept::new(codes.iter().map(|c| icd10(c)).collect()).unwrap(),
        ))
    }

    fn query_for(code: &str) -> String {
        format!("Condition?code={ICD10}|{code}")
    }

    #[derive(Default)]
    struct StubQueryService {
        populations: Mutex<HashMap<String, Population>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubQueryService {
        fn with(self, code: &str, ids: &[&str]) -> Self {
            self.populations
                .lock()
                .insert(query_for(code), Population::of(ids.iter().copied()).unwrap());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FhirQueryService for StubQueryService {
        async fn execute(
            &self,
            query: &Query,
            _ignore_cache: bool,
        ) -> std::result::Result<Population, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.populations
                .lock()
                .get(&query.to_string())
                .cloned()
                .ok_or_else(|| ExecutorError::backend(format!("no data for {query}")))
        }
    }

    fn service(stub: Arc<StubQueryService>, codes: &[&str]) -> StructuredQueryService {
        service_with_config(stub, codes, EvaluationConfig::default())
    }

    fn service_with_config(
        stub: Arc<StubQueryService>,
        codes: &[&str],
        config: EvaluationConfig,
    ) -> StructuredQueryService {
        let mappings = codes.iter().map(|code| {
            let mut mapping = Mapping::new(icd10(code), diagnosis(), "Condition");
            mapping.term_code_search_parameter = Some("code".to_string());
            mapping
        });
        StructuredQueryService::new(stub, Arc::new(MappingContext::new(mappings, None)), config)
    }

    fn cnf(groups: Vec<Vec<Criterion>>) -> crate::group::Cnf {
        CriterionGroup::new(
            groups
                .into_iter()
                .map(|g| CriterionGroup::new(g).unwrap())
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_inclusion_minus_identical_exclusion_is_empty() {
        let stub = Arc::new(StubQueryService::default().with("C71", &["p1"]));
        let service = service(stub, &["C71"]);
        let query = StructuredQuery::new(
            cnf(vec![vec![criterion(&["C71"])]]),
            Some(cnf(vec![vec![criterion(&["C71"])]])),
        );

        assert_eq!(service.execute(&query).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inclusion_groups_are_intersected() {
        let stub = Arc::new(StubQueryService::default().with("C72", &["p1"]).with("C73", &["p1"]));
        let service = service(stub, &["C72", "C73"]);
        let query = StructuredQuery::new(
            cnf(vec![vec![criterion(&["C72"])], vec![criterion(&["C73"])]]),
            None,
        );
        assert_eq!(service.execute(&query).await.unwrap(), 1);

        let stub = Arc::new(StubQueryService::default().with("C72", &["p1"]).with("C73", &["p2"]));
        let service = service_with_config(stub, &["C72", "C73"], EvaluationConfig::default());
        assert_eq!(service.execute(&query).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_criteria_within_group_are_unioned() {
        let stub = Arc::new(StubQueryService::default().with("C72", &["p1"]).with("C73", &["p2"]));
        let service = service(stub, &["C72", "C73"]);
        let query = StructuredQuery::new(
            cnf(vec![vec![criterion(&["C72"]), criterion(&["C73"])]]),
            None,
        );

        let population = service.execute_population(&query).await.unwrap();
        assert_eq!(population.sorted_ids(), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_exclusion_is_or_of_and() {
        let stub = Arc::new(
            StubQueryService::default()
                .with("C71", &["p1", "p2", "p3", "p4"])
                .with("C72", &["p1", "p2"])
                .with("C73", &["p2", "p3"])
                .with("C74", &["p4"]),
        );
        let service = service(stub, &["C71", "C72", "C73", "C74"]);

        // excluded = (C72 ∧ C73) ∨ C74 = {p2} ∪ {p4}
        let query = StructuredQuery::new(
            cnf(vec![vec![criterion(&["C71"])]]),
            Some(cnf(vec![
                vec![criterion(&["C72"]), criterion(&["C73"])],
                vec![criterion(&["C74"])],
            ])),
        );

        let population = service.execute_population(&query).await.unwrap();
        assert_eq!(population.sorted_ids(), vec!["p1", "p3"]);
    }

    #[tokio::test]
    async fn test_empty_criteria_match_nobody() {
        let stub = Arc::new(StubQueryService::default());
        let service = service(stub.clone(), &[]);

        assert!(service.execute_or(&[]).await.unwrap().is_empty());
        assert!(service.execute_cnf(&[]).await.unwrap().is_empty());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_execute_or_and_cnf() {
        let stub = Arc::new(
            StubQueryService::default()
                .with("C71", &["p1", "p2"])
                .with("C72", &["p3"])
                .with("C73", &["p2", "p3"]),
        );
        let service = service(stub, &["C71", "C72", "C73"]);

        let or = service
            .execute_or(&[criterion(&["C71"]), criterion(&["C72"])])
            .await
            .unwrap();
        assert_eq!(or.sorted_ids(), vec!["p1", "p2", "p3"]);

        let groups = vec![
            CriterionGroup::new(vec![criterion(&["C71"]), criterion(&["C72"])]).unwrap(),
            CriterionGroup::of(criterion(&["C73"])),
        ];
        let cnf = service.execute_cnf(&groups).await.unwrap();
        assert_eq!(cnf.sorted_ids(), vec!["p2", "p3"]);
    }

    #[tokio::test]
    async fn test_fan_out_is_unioned_and_duplicates_dispatched_once() {
        let stub = Arc::new(StubQueryService::default().with("C71", &["p1"]).with("C72", &["p2"]));
        let service = service(stub.clone(), &["C71", "C72"]);

        let population = service
            .execute_or(&[criterion(&["C71", "C72", "C71"])])
            .await
            .unwrap();
        assert_eq!(population.sorted_ids(), vec!["p1", "p2"]);
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_any_failure_fails_the_whole_query_after_siblings_finish() {
        let stub = Arc::new(StubQueryService::default().with("C71", &["p1"]).with("C72", &["p2"]));
        let service = service(stub.clone(), &["C71", "C72", "C73"]);
        let query = StructuredQuery::new(
            cnf(vec![vec![
                criterion(&["C71"]),
                criterion(&["C73"]),
                criterion(&["C72"]),
            ]]),
            None,
        );

        let err = service.execute(&query).await.unwrap_err();
        assert_eq!(
            err,
            FeasibilityError::from(ExecutorError::backend(format!(
                "no data for {}",
                query_for("C73")
            )))
        );
        assert!(err.is_server_error());
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test]
    async fn test_expansion_errors_prevent_dispatch() {
        let stub = Arc::new(StubQueryService::default().with("C71", &["p1"]));
        let service = service(stub.clone(), &["C71"]);
        let query = StructuredQuery::new(
            cnf(vec![vec![criterion(&["C71"])], vec![criterion(&["C99"])]]),
            None,
        );

        let err = service.execute(&query).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let codes: Vec<String> = (0..20).map(|i| format!("C{i:02}")).collect();
        let code_refs: Vec<&str> = codes.iter().map(String::as_str).collect();
        let stub = Arc::new(
            code_refs
                .iter()
                .fold(StubQueryService::default(), |stub, code| stub.with(code, &["p1"])),
        );
        let service = service_with_config(
            stub.clone(),
            &code_refs,
            EvaluationConfig {
                max_concurrent_queries: 4,
            },
        );

        let population = service.execute_or(&[criterion(&code_refs)]).await.unwrap();
        assert_eq!(population.len(), 1);
        assert_eq!(stub.calls(), 20);
        assert!(stub.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn test_translate() {
        let stub = Arc::new(StubQueryService::default());
        let service = service(stub.clone(), &["C71", "C72"]);
        let query = StructuredQuery::new(
            cnf(vec![vec![criterion(&["C71", "C72"])]]),
            Some(cnf(vec![vec![criterion(&["C72"])]])),
        );

        let translated = service.translate(&query).unwrap();
        assert_eq!(
            translated.inclusion[0][0].queries,
            vec![query_for("C71"), query_for("C72")]
        );
        assert_eq!(translated.exclusion[0][0].queries, vec![query_for("C72")]);
        assert_eq!(translated.query_count(), 3);
        assert_eq!(stub.calls(), 0);
    }

    #[test]
    fn test_execute_outside_async_test() {
        let stub = Arc::new(StubQueryService::default().with("C71", &["p1", "p2"]));
        let service = service(stub, &["C71"]);
        let query = StructuredQuery::new(cnf(vec![vec![criterion(&["C71"])]]), None);

        let count = tokio_test::block_on(service.execute(&query)).unwrap();
        assert_eq!(count, 2);
    }
}
