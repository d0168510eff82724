//! `GET /accessories`.

use crate::http::Response;
use crate::model::{json, Accessory};

/// Renders the full accessory graph. Always succeeds: there is no
/// per-object permission check on this endpoint, only on individual
/// characteristic reads via `/characteristics`.
#[must_use]
pub fn get(accessories: &[Accessory]) -> Response {
    let body = serde_json::to_vec(&json::accessories_to_json(accessories)).unwrap_or_default();
    Response::json(200, "OK", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::Category;
    use crate::model::{Characteristic, Format, Perms, Service};
    use uuid::Uuid;

    #[test]
    fn renders_every_accessory_in_the_set() {
        let mut acc = Accessory::new(1, Category::Lightbulb);
        acc.add_service(
            Service::new(Uuid::new_v4()).with_characteristic(
                Characteristic::builder(Uuid::new_v4(), Format::Bool)
                    .perms(Perms::READ)
                    .build(),
            ),
        );
        let resp = get(std::slice::from_ref(&acc));
        assert_eq!(resp.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["accessories"].as_array().unwrap().len(), 1);
    }
}
