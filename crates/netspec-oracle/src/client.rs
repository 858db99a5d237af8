//! The backend trait the engine drives.

use netspec_model::environment::ConcreteEnvironment;

use crate::query::Query;
use crate::OracleError;

/// A verification backend.
///
/// Two capabilities back the whole mining loop: computing the dataplane
/// of one concrete failure environment (a FIB dump as flat text, see
/// `netspec_dataplane::engine`), and answering a symbolic [`Query`] over
/// all environments within the failure budget (raw response text, see
/// [`crate::response::ResponseGrammar`]). Both return the backend's raw
/// strings; parsing stays with the caller so a scripted test backend
/// can speak the exact same format.
pub trait VerificationOracle {
    /// Compute the FIB dump for one concrete environment.
    fn dataplane(&mut self, environment: &ConcreteEnvironment) -> Result<String, OracleError>;

    /// Answer a symbolic query over every environment in the budget.
    fn verify(&mut self, query: &Query) -> Result<String, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use netspec_model::environment::Environment;
    use netspec_model::link::Link;
    use netspec_model::policy::{
        PolicyDestination, PolicySource, PolicySpecifics, PolicyType,
    };

    /// Serves canned dumps keyed by the failed-link set and canned
    /// responses keyed by query wire string.
    struct ScriptedOracle {
        dataplanes: BTreeMap<Vec<String>, String>,
        responses: BTreeMap<String, String>,
    }

    impl VerificationOracle for ScriptedOracle {
        fn dataplane(
            &mut self,
            environment: &ConcreteEnvironment,
        ) -> Result<String, OracleError> {
            let mut key: Vec<String> =
                environment.down_links().iter().map(|l| l.to_string()).collect();
            key.sort();
            self.dataplanes
                .get(&key)
                .cloned()
                .ok_or_else(|| OracleError::Unavailable(format!("no dataplane for {key:?}")))
        }

        fn verify(&mut self, query: &Query) -> Result<String, OracleError> {
            self.responses
                .get(&query.wire_string())
                .cloned()
                .ok_or_else(|| OracleError::Unavailable("unscripted query".to_string()))
        }
    }

    #[test]
    fn scripted_oracle_answers_by_wire_string() {
        let environment = Environment::with_max_failures([Link::new("l0", "r1", "r2")], 1);
        let query = Query::new(
            PolicyType::Reachability,
            vec![PolicySource("r2".into())],
            PolicyDestination::new("r1", "eth0", "10.0.0.0/24".parse().unwrap()),
            PolicySpecifics::None,
            environment.clone(),
            false,
        );

        let mut oracle = ScriptedOracle {
            dataplanes: BTreeMap::from([(Vec::new(), "# Router:r1\n".to_string())]),
            responses: BTreeMap::from([(query.wire_string(), "Verified".to_string())]),
        };

        let all_up = environment.concrete_env(0).unwrap();
        assert_eq!(oracle.dataplane(&all_up).unwrap(), "# Router:r1\n");
        assert_eq!(oracle.verify(&query).unwrap(), "Verified");

        let missing = Query::new(
            PolicyType::Isolation,
            vec![PolicySource("r2".into())],
            PolicyDestination::new("r1", "eth0", "10.0.0.0/24".parse().unwrap()),
            PolicySpecifics::None,
            environment,
            false,
        );
        assert!(matches!(
            oracle.verify(&missing),
            Err(OracleError::Unavailable(_))
        ));
    }
}
