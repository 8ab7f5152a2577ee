use headers::HeaderMapExt;
use http::{Request, Response};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::util::DavMethod;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_options(
        &self,
        _req: &Request<()>,
        path: &DavPath,
    ) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        let h = res.headers_mut();
        // Class 2 is advertised even without a lock provider; LOCK
        // support may live in another part of the URL space.
        h.insert("DAV", "1,2".parse().unwrap());
        h.insert("MS-Author-Via", "DAV".parse().unwrap());
        h.typed_insert(headers::ContentLength(0));

        let meta = self.stat(path.as_str()).await;
        let is_unmapped = meta.is_err();
        let is_file = meta.map(|m| !m.is_dir).unwrap_or_default();

        let locks_ok = self.ls.is_some();
        let mut v = Vec::new();
        let mut mm = |name: &str, m: DavMethod| {
            let islock = m == DavMethod::LOCK || m == DavMethod::UNLOCK;
            if self.allow.contains(m) && (!islock || locks_ok) {
                v.push(name.to_string());
            }
        };

        if is_unmapped {
            mm("OPTIONS", DavMethod::OPTIONS);
            mm("MKCOL", DavMethod::MKCOL);
            mm("PUT", DavMethod::PUT);
            mm("LOCK", DavMethod::LOCK);
        } else {
            if is_file {
                mm("HEAD", DavMethod::HEAD);
                mm("GET", DavMethod::GET);
                mm("PUT", DavMethod::PUT);
            }
            mm("OPTIONS", DavMethod::OPTIONS);
            mm("PROPFIND", DavMethod::PROPFIND);
            mm("PROPPATCH", DavMethod::PROPPATCH);
            mm("COPY", DavMethod::COPY);
            if !path.is_root() {
                mm("MOVE", DavMethod::MOVE);
                mm("DELETE", DavMethod::DELETE);
            }
            mm("LOCK", DavMethod::LOCK);
            mm("UNLOCK", DavMethod::UNLOCK);
        }

        let allow = v.join(",").parse().unwrap_or_else(|_| "OPTIONS".parse().unwrap());
        res.headers_mut().insert("allow", allow);

        Ok(res)
    }
}
