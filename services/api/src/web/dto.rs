//! services/api/src/web/dto.rs
//!
//! Query types shared by the restructuring and grounding routes.

use serde::Deserialize;
use utoipa::IntoParams;

/// `?limit=&offset=` on the list endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// 1 to 100, 50 when omitted.
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
