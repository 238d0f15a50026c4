use crate::config::RemoteAuthorityConfig;
use crate::domain::authorization::{AuthorizationResponse, OneOrMany};
use crate::domain::ports::AuthorizationService;
use crate::domain::voucher::Environment;
use crate::error::{AuthorizerError, Result};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Client for the tax authority's offline authorization SOAP service.
///
/// The endpoint is chosen per call from the voucher's environment.
#[derive(Clone)]
pub struct SoapAuthorizationClient {
    http: reqwest::Client,
    test_endpoint: String,
    production_endpoint: String,
}

impl SoapAuthorizationClient {
    pub fn new(config: &RemoteAuthorityConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthorizerError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            test_endpoint: service_url(&config.test_endpoint),
            production_endpoint: service_url(&config.production_endpoint),
        })
    }

    fn endpoint(&self, environment: Environment) -> &str {
        match environment {
            Environment::Test => &self.test_endpoint,
            Environment::Production => &self.production_endpoint,
        }
    }
}

#[async_trait]
impl AuthorizationService for SoapAuthorizationClient {
    async fn authorize(
        &self,
        access_key: &str,
        environment: Environment,
    ) -> Result<AuthorizationResponse> {
        let endpoint = self.endpoint(environment);
        debug!(%access_key, %environment, %endpoint, "calling authorization service");

        let response = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", "\"\"")
            .body(envelope(access_key))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(%access_key, %status, "authorization service answered");

        if !status.is_success() {
            let fault = parse_response(&body)
                .err()
                .map(|e| format!(": {e}"))
                .unwrap_or_default();
            return Err(AuthorizerError::RemoteAuthority(format!(
                "HTTP {status}{fault}"
            )));
        }

        parse_response(&body)
    }
}

/// Endpoints are commonly configured with their WSDL suffix.
fn service_url(endpoint: &str) -> String {
    endpoint
        .strip_suffix("?wsdl")
        .or_else(|| endpoint.strip_suffix("?WSDL"))
        .unwrap_or(endpoint)
        .to_string()
}

fn transport_error(err: reqwest::Error) -> AuthorizerError {
    if err.is_timeout() {
        AuthorizerError::RemoteAuthority(format!("request timed out: {err}"))
    } else {
        AuthorizerError::RemoteAuthority(err.to_string())
    }
}

fn envelope(access_key: &str) -> String {
    let access_key = quick_xml::escape::escape(access_key);
    format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:ec="http://ec.gob.sri.ws.autorizacion">"#,
            "<soapenv:Header/><soapenv:Body><ec:autorizacionComprobante>",
            "<claveAccesoComprobante>{}</claveAccesoComprobante>",
            "</ec:autorizacionComprobante></soapenv:Body></soapenv:Envelope>"
        ),
        access_key
    )
}

#[derive(Default)]
struct MessageFields {
    identifier: String,
    text: String,
    additional: String,
}

impl MessageFields {
    fn render(self) -> String {
        let mut rendered = match (self.identifier.is_empty(), self.text.is_empty()) {
            (false, false) => format!("{}: {}", self.identifier, self.text),
            (false, true) => self.identifier,
            _ => self.text,
        };
        if !self.additional.is_empty() {
            rendered.push_str(&format!(" [{}]", self.additional));
        }
        rendered
    }
}

/// Extracts the first `autorizacion` element of an authorization response.
///
/// Element names are matched without namespace prefixes. A response without
/// any `autorizacion` yields an empty, not granted, response. A SOAP fault is
/// reported as a `RemoteAuthority` error.
pub fn parse_response(xml: &str) -> Result<AuthorizationResponse> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut response = AuthorizationResponse::default();
    let mut messages = Vec::new();
    let mut current_message: Option<MessageFields> = None;
    let mut path: Vec<String> = Vec::new();
    let mut authorization_depth: Option<usize> = None;
    let mut fault: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| AuthorizerError::RemoteAuthority(format!("invalid XML response: {e}")))?;

        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if name == "Fault" && fault.is_none() {
                    fault = Some(String::new());
                }
                path.push(name);
                match authorization_depth {
                    None if path.last().is_some_and(|n| n == "autorizacion") => {
                        authorization_depth = Some(path.len());
                    }
                    Some(depth) if relative(&path, depth) == ["mensajes", "mensaje"] => {
                        current_message = Some(MessageFields::default());
                    }
                    _ => {}
                }
            }
            Event::End(_) => {
                if let Some(depth) = authorization_depth {
                    if path.len() == depth {
                        break;
                    }
                    if relative(&path, depth) == ["mensajes", "mensaje"]
                        && let Some(message) = current_message.take()
                    {
                        messages.push(message.render());
                    }
                }
                path.pop();
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| {
                    AuthorizerError::RemoteAuthority(format!("invalid XML text: {e}"))
                })?;
                capture(
                    &path,
                    authorization_depth,
                    &text,
                    &mut response,
                    &mut current_message,
                    &mut fault,
                );
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                capture(
                    &path,
                    authorization_depth,
                    &text,
                    &mut response,
                    &mut current_message,
                    &mut fault,
                );
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if authorization_depth.is_none()
        && let Some(fault) = fault
    {
        return Err(AuthorizerError::RemoteAuthority(format!(
            "SOAP fault: {}",
            if fault.is_empty() { "unknown" } else { fault.as_str() }
        )));
    }

    response.messages = match messages.len() {
        0 => None,
        1 => messages.pop().map(OneOrMany::One),
        _ => Some(OneOrMany::Many(messages)),
    };
    Ok(response)
}

fn relative(path: &[String], depth: usize) -> &[String] {
    path.get(depth..).unwrap_or_default()
}

fn capture(
    path: &[String],
    authorization_depth: Option<usize>,
    text: &str,
    response: &mut AuthorizationResponse,
    current_message: &mut Option<MessageFields>,
    fault: &mut Option<String>,
) {
    let Some(depth) = authorization_depth else {
        if let Some(fault) = fault
            && path.last().is_some_and(|n| n == "faultstring")
        {
            fault.push_str(text);
        }
        return;
    };

    let target = match relative(path, depth) {
        [field] if field == "estado" => response.status.get_or_insert_with(String::new),
        [field] if field == "comprobante" => response.voucher.get_or_insert_with(String::new),
        [field] if field == "fechaAutorizacion" => {
            response.authorization_date.get_or_insert_with(String::new)
        }
        [mensajes, mensaje, field] if mensajes == "mensajes" && mensaje == "mensaje" => {
            let Some(message) = current_message.as_mut() else {
                return;
            };
            match field.as_str() {
                "identificador" => &mut message.identifier,
                "mensaje" => &mut message.text,
                "informacionAdicional" => &mut message.additional,
                _ => return,
            }
        }
        _ => return,
    };
    target.push_str(text);
}
