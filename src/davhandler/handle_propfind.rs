//! PROPFIND and PROPPATCH.
//!
//! PROPFIND drives the directory walker and renders a multistatus
//! response from cached metadata, caching every node it discovers on
//! the way. Dead-property storage belongs to the external property
//! subsystem; PROPPATCH therefore answers each requested change with a
//! `403` propstat.

use http::{Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use xmltree::Element;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::finfo::Finfo;
use crate::util::{parse_depth, systemtime_to_httpdate, systemtime_to_rfc3339, xml_escape};
use crate::walker::WalkError;
use crate::DavResult;

/// Live properties served for every node.
const LIVE_PROPS: &[&str] = &[
    "creationdate",
    "displayname",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "resourcetype",
];

enum PropfindRequest {
    Allprop,
    Propname,
    Prop(Vec<String>),
}

fn parse_propfind(body: &[u8]) -> DavResult<PropfindRequest> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        // An empty body means allprop.
        return Ok(PropfindRequest::Allprop);
    }
    let root = Element::parse(body).map_err(|_| DavError::XmlParseError)?;
    if root.name != "propfind" {
        return Err(DavError::XmlParseError);
    }
    if root.get_child("allprop").is_some() {
        return Ok(PropfindRequest::Allprop);
    }
    if root.get_child("propname").is_some() {
        return Ok(PropfindRequest::Propname);
    }
    if let Some(prop) = root.get_child("prop") {
        let names = prop
            .children
            .iter()
            .filter_map(|c| c.as_element())
            .map(|e| e.name.clone())
            .collect();
        return Ok(PropfindRequest::Prop(names));
    }
    Err(DavError::XmlParseError)
}

/// One `<D:propstat>` worth of properties sharing a status.
struct Propstat {
    status: StatusCode,
    props: String,
}

struct MultistatusWriter {
    buf: String,
}

impl MultistatusWriter {
    fn new() -> MultistatusWriter {
        MultistatusWriter {
            buf: String::from(
                "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n\
                 <D:multistatus xmlns:D=\"DAV:\">\n",
            ),
        }
    }

    fn write_response(&mut self, href: &str, propstats: &[Propstat]) {
        self.buf.push_str("<D:response>\n<D:href>");
        self.buf.push_str(&xml_escape(href));
        self.buf.push_str("</D:href>\n");
        for ps in propstats {
            if ps.props.is_empty() {
                continue;
            }
            self.buf.push_str("<D:propstat>\n<D:prop>");
            self.buf.push_str(&ps.props);
            self.buf.push_str("</D:prop>\n<D:status>HTTP/1.1 ");
            self.buf.push_str(&ps.status.to_string());
            self.buf.push_str("</D:status>\n</D:propstat>\n");
        }
        self.buf.push_str("</D:response>\n");
    }

    fn close(mut self) -> String {
        self.buf.push_str("</D:multistatus>\n");
        self.buf
    }
}

/// Render one live property of `info`, or report it absent.
fn live_prop(info: &Finfo, name: &str) -> Option<String> {
    match name {
        "displayname" => Some(format!(
            "<D:displayname>{}</D:displayname>",
            xml_escape(&info.name)
        )),
        "resourcetype" => Some(if info.is_dir {
            "<D:resourcetype><D:collection/></D:resourcetype>".to_string()
        } else {
            "<D:resourcetype/>".to_string()
        }),
        "getlastmodified" => Some(format!(
            "<D:getlastmodified>{}</D:getlastmodified>",
            systemtime_to_httpdate(info.mod_time)
        )),
        "creationdate" => Some(format!(
            "<D:creationdate>{}</D:creationdate>",
            systemtime_to_rfc3339(info.mod_time)
        )),
        "getetag" => Some(format!("<D:getetag>{}</D:getetag>", xml_escape(&info.etag()))),
        "getcontentlength" if !info.is_dir => Some(format!(
            "<D:getcontentlength>{}</D:getcontentlength>",
            info.size
        )),
        "getcontenttype" if !info.is_dir => {
            let mime = mime_guess::from_path(&info.name).first_or_octet_stream();
            Some(format!(
                "<D:getcontenttype>{}</D:getcontenttype>",
                xml_escape(mime.as_ref())
            ))
        }
        _ => None,
    }
}

fn propstats_for(info: &Finfo, pf: &PropfindRequest) -> Vec<Propstat> {
    match pf {
        PropfindRequest::Allprop => {
            let props: String = LIVE_PROPS
                .iter()
                .filter_map(|name| live_prop(info, name))
                .collect();
            vec![Propstat {
                status: StatusCode::OK,
                props,
            }]
        }
        PropfindRequest::Propname => {
            let props: String = LIVE_PROPS
                .iter()
                .filter(|name| live_prop(info, name).is_some())
                .map(|name| format!("<D:{name}/>"))
                .collect();
            vec![Propstat {
                status: StatusCode::OK,
                props,
            }]
        }
        PropfindRequest::Prop(names) => {
            let mut found = String::new();
            let mut missing = String::new();
            for name in names {
                match live_prop(info, name) {
                    Some(rendered) => found.push_str(&rendered),
                    None => missing.push_str(&format!("<D:{}/>", xml_escape(name))),
                }
            }
            vec![
                Propstat {
                    status: StatusCode::OK,
                    props: found,
                },
                Propstat {
                    status: StatusCode::NOT_FOUND,
                    props: missing,
                },
            ]
        }
    }
}

impl crate::DavHandler {
    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        path: &DavPath,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let info = self.stat(path.as_str()).await?;

        let depth_hdr = req
            .headers()
            .get("depth")
            .and_then(|v| v.to_str().ok());
        let depth = parse_depth(depth_hdr)?;
        let pf = parse_propfind(body)?;

        let prefix = self.prefix.clone();
        let mut mw = MultistatusWriter::new();
        let ctx = CancellationToken::new();

        let walk_result = self
            .walker
            .walk(
                &ctx,
                depth.as_walk_depth(),
                path.as_str(),
                &info,
                &mut |node_path, node_info| {
                    self.cache_file(node_path, node_info);

                    let href_path = match DavPath::new(node_path) {
                        Ok(p) => p.as_url_string(),
                        Err(_) => return Err(WalkError::Other(DavError::InvalidPath)),
                    };
                    let mut href = format!("{}{}", prefix, href_path);
                    if href != "/" && node_info.is_dir {
                        href.push('/');
                    }
                    mw.write_response(&href, &propstats_for(node_info, &pf));
                    Ok(())
                },
            )
            .await;

        if let Err(e) = walk_result {
            let err = match e {
                WalkError::SkipDir => DavError::Status(StatusCode::INTERNAL_SERVER_ERROR),
                WalkError::Other(err) => {
                    error!("propfind walk of {path} failed: {err}");
                    DavError::Status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            };
            return Err(err);
        }

        let resp = Response::builder()
            .status(StatusCode::MULTI_STATUS)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(Body::from(mw.close()))
            .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?;
        Ok(resp)
    }

    pub(crate) async fn handle_proppatch(
        &self,
        _req: &Request<()>,
        path: &DavPath,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        // make sure the node exists before answering.
        let info = self.stat(path.as_str()).await?;

        let root = Element::parse(body).map_err(|_| DavError::XmlParseError)?;
        if root.name != "propertyupdate" {
            return Err(DavError::XmlParseError);
        }
        let mut names = Vec::new();
        for update in root.children.iter().filter_map(|c| c.as_element()) {
            if update.name != "set" && update.name != "remove" {
                continue;
            }
            if let Some(prop) = update.get_child("prop") {
                for p in prop.children.iter().filter_map(|c| c.as_element()) {
                    names.push(p.name.clone());
                }
            }
        }
        if names.is_empty() {
            return Err(DavError::XmlParseError);
        }

        // Live properties are protected and there is no dead-property
        // store behind the gateway.
        let refused: String = names
            .iter()
            .map(|n| format!("<D:{}/>", xml_escape(n)))
            .collect();
        let mut mw = MultistatusWriter::new();
        let mut href = format!("{}{}", self.prefix, path.as_url_string());
        if href != "/" && info.is_dir {
            href.push('/');
        }
        mw.write_response(
            &href,
            &[Propstat {
                status: StatusCode::FORBIDDEN,
                props: refused,
            }],
        );

        let resp = Response::builder()
            .status(StatusCode::MULTI_STATUS)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(Body::from(mw.close()))
            .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?;
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn empty_body_is_allprop() {
        assert!(matches!(
            parse_propfind(b"").unwrap(),
            PropfindRequest::Allprop
        ));
        assert!(matches!(
            parse_propfind(b"  \n").unwrap(),
            PropfindRequest::Allprop
        ));
    }

    #[test]
    fn parses_prop_list() {
        let body = br#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:">
              <D:prop><D:getetag/><D:getcontentlength/></D:prop>
            </D:propfind>"#;
        match parse_propfind(body).unwrap() {
            PropfindRequest::Prop(names) => {
                assert_eq!(names, vec!["getetag", "getcontentlength"])
            }
            _ => panic!("expected prop request"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_propfind(b"<not-xml").is_err());
        assert!(parse_propfind(b"<foo/>").is_err());
    }

    #[test]
    fn dir_props_have_no_length() {
        let d = Finfo::dir("/m");
        assert!(live_prop(&d, "getcontentlength").is_none());
        assert!(live_prop(&d, "resourcetype").unwrap().contains("collection"));

        let f = Finfo::file("/m/a.txt", 5, UNIX_EPOCH);
        assert_eq!(
            live_prop(&f, "getcontentlength").unwrap(),
            "<D:getcontentlength>5</D:getcontentlength>"
        );
    }
}
