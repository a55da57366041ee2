use poem_openapi::payload::{Binary, Json};
use poem_openapi::ApiResponse;

use crate::types::{ErrorResponse, PdfArtifact, PdfError};

#[derive(ApiResponse)]
pub enum GeneratePdfResponse {
    /// The rendered document
    #[oai(status = 200, content_type = "application/pdf")]
    Pdf(
        Binary<Vec<u8>>,
        #[oai(header = "Content-Disposition")] String,
        #[oai(header = "Content-Length")] u64,
    ),
    /// Any failure while generating the document
    #[oai(status = 500)]
    Error(Json<ErrorResponse>),
}

impl GeneratePdfResponse {
    pub fn from_artifact(artifact: PdfArtifact) -> Self {
        let disposition = artifact.content_disposition();
        let length = artifact.data.len() as u64;
        GeneratePdfResponse::Pdf(Binary(artifact.data), disposition, length)
    }

    pub fn from_error(error: &PdfError) -> Self {
        GeneratePdfResponse::Error(Json(ErrorResponse::from_pdf_error(error)))
    }
}
