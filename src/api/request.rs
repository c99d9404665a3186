use serde::Serialize;
use std::collections::HashMap;

const OPERATION_NAME: &str = "getUserWithBillingAccount";

const BATTERY_QUERY: &str = "query getUserWithBillingAccount {
  me {
    billingAccounts {
      agreements {
        bv {
          currentCharge
          totalInjection
          startDate
          updateDate
        }
      }
    }
  }
}";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlOperation {
    pub operation_name: &'static str,
    pub variables: HashMap<String, String>,
    pub query: &'static str,
}

/// The provider only answers batched operations, so even a single query goes in an array.
pub fn battery_query() -> Vec<GraphqlOperation> {
    vec![GraphqlOperation {
        operation_name: OPERATION_NAME,
        variables: HashMap::new(),
        query: BATTERY_QUERY,
    }]
}
