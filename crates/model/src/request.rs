/// A query to be sent to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryRequest {
    /// The natural-language query.
    pub query: String,
    /// Server-side paths of the uploaded attachments, in upload order.
    pub file_paths: Vec<String>,
    /// The thread this query belongs to.
    ///
    /// The thread doesn't need to be known to the backend yet, a locally
    /// minted thread becomes durable with its first query.
    pub thread_id: String,
}
