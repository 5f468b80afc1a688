//! Function-to-route registry.
//!
//! Listings and validations are GET; everything that carries a request body
//! is POST. Validations take their subject as a URL path segment.

use booking_agent_core::FunctionName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// The HTTP shape of one backend function.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub method: HttpMethod,
    pub path: &'static str,
    /// Argument key appended to the path as a percent-encoded segment.
    pub path_arg: Option<&'static str>,
}

pub fn route(name: FunctionName) -> Route {
    match name {
        FunctionName::ListProcedures => Route {
            method: HttpMethod::Get,
            path: "/api/procedures",
            path_arg: None,
        },
        FunctionName::ListUnits => Route {
            method: HttpMethod::Get,
            path: "/api/units",
            path_arg: None,
        },
        FunctionName::ValidateProcedure => Route {
            method: HttpMethod::Get,
            path: "/api/procedures/validate",
            path_arg: Some("name"),
        },
        FunctionName::ValidateUnit => Route {
            method: HttpMethod::Get,
            path: "/api/units/validate",
            path_arg: Some("name"),
        },
        FunctionName::CheckAvailability => Route {
            method: HttpMethod::Post,
            path: "/api/appointments/availability",
            path_arg: None,
        },
        FunctionName::CheckDuplicate => Route {
            method: HttpMethod::Post,
            path: "/api/appointments/duplicate-check",
            path_arg: None,
        },
        FunctionName::CreateAppointment => Route {
            method: HttpMethod::Post,
            path: "/api/appointments",
            path_arg: None,
        },
    }
}
